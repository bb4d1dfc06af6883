use thiserror::Error;

#[derive(Error, Debug)]
pub enum EwelinkError {
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error("Invalid signing key")]
    InvalidKey,

    #[error("Cloud request failed with error {code}: {msg}")]
    Cloud { code: i64, msg: String },

    #[error("Device reply carried no data")]
    MissingData,
}

pub type EwelinkResult<T> = Result<T, EwelinkError>;
