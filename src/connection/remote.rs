use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use ewebridge_api::config::RemoteCredentials;
use ewelink::cloud::{
    self, API_VERSION, CloudReply, DeviceList, LoginRequest, LoginResponse, Session, StatusBody,
    StatusRequest, SwitchParams,
};
use ewelink::socket::{PING, PONG, UserOnline};
use ewelink::{Device, DeviceState, EwelinkError, SocketMessage, sign};

use crate::connection::{AuthGate, Authentication, Connection, absorb};
use crate::error::{ApiError, ApiResult};

const TRANSPORT: &str = "eweLink";

/// Connection to the eWeLink cloud, using account credentials.
pub struct RemoteConnection {
    creds: RemoteCredentials,
    http: reqwest::Client,
    gate: AuthGate,
    session: RwLock<Option<Session>>,
    socket: Mutex<Option<CancellationToken>>,
}

/// Backoff for reconnecting the push socket.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub ping_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            ping_interval: Duration::from_secs(120),
        }
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl RemoteConnection {
    const DEFAULT_TIMEOUT_SECS: u64 = 10;

    pub fn new(creds: RemoteCredentials) -> ApiResult<Self> {
        Self::with_gate(creds, AuthGate::new())
    }

    pub fn with_gate(creds: RemoteCredentials, gate: AuthGate) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            creds,
            http,
            gate,
            session: RwLock::new(None),
            socket: Mutex::new(None),
        })
    }

    fn app_credentials(&self) -> ApiResult<(&str, &str)> {
        match (self.creds.app_id.as_deref(), self.creds.app_secret.as_deref()) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(ApiError::service_error(
                "[remote] app_id and app_secret must be configured for cloud access",
            )),
        }
    }

    fn base_url(&self, region: &str) -> ApiResult<Url> {
        match &self.creds.api_url {
            Some(url) => Ok(url.clone()),
            None => Ok(Url::parse(&cloud::api_base_url(region))?),
        }
    }

    async fn session(&self) -> ApiResult<Session> {
        self.gate.wait().await?;
        self.session
            .read()
            .await
            .clone()
            .ok_or(ApiError::NotAuthenticated { attempts: 0 })
    }

    async fn login_at(&self, base: &Url) -> ApiResult<LoginResponse> {
        let (appid, secret) = self.app_credentials()?;
        let body = serde_json::to_vec(&LoginRequest {
            email: &self.creds.email,
            password: &self.creds.password,
            version: API_VERSION,
            ts: chrono::Utc::now().timestamp(),
            nonce: sign::nonce(),
            appid,
        })?;
        let signature = sign::sign_payload(secret, &body)?;

        let response = self
            .http
            .post(base.join("api/user/login")?)
            .header("Authorization", format!("Sign {signature}"))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn login(&self) -> ApiResult<Session> {
        let base = self.base_url(&self.creds.region)?;
        let mut resp = self.login_at(&base).await?;

        if let Some(region) = resp.redirect().map(ToString::to_string) {
            if self.creds.api_url.is_some() {
                return Err(ApiError::service_error(format!(
                    "[remote] Account lives in region [{region}], but api_url is fixed"
                )));
            }
            log::info!("[remote] Account lives in region [{region}], logging in again");
            resp = self.login_at(&self.base_url(&region)?).await?;
        }

        Ok(Session::try_from(resp)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<T> {
        let session = self.session().await?;
        let (appid, _) = self.app_credentials()?;
        let nonce = sign::nonce();
        let ts = chrono::Utc::now().timestamp().to_string();
        let version = API_VERSION.to_string();

        let response = self
            .http
            .get(self.base_url(&session.region)?.join(path)?)
            .bearer_auth(&session.at)
            .query(query)
            .query(&[
                ("appid", appid),
                ("nonce", nonce.as_str()),
                ("ts", ts.as_str()),
                ("version", version.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let session = self.session().await?;
        let response = self
            .http
            .post(self.base_url(&session.region)?.join(path)?)
            .bearer_auth(&session.at)
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn fetch_devices(&self) -> ApiResult<Vec<Device>> {
        let reply: CloudReply<DeviceList> = self
            .get("api/user/device", &[("lang", "en"), ("getTags", "1")])
            .await?;
        Ok(reply.into_result()?.devicelist)
    }

    async fn fetch_device(&self, device_id: &str) -> ApiResult<Device> {
        let reply: CloudReply<Device> = self.get(&format!("api/user/device/{device_id}"), &[]).await?;
        match reply.into_result() {
            Err(EwelinkError::Cloud {
                code: cloud::ERROR_NOT_FOUND,
                ..
            }) => Err(ApiError::DeviceNotFound(device_id.to_string())),
            res => Ok(res?),
        }
    }

    async fn fetch_state(&self, device_id: &str) -> ApiResult<DeviceState> {
        let reply: CloudReply<StatusBody> = self
            .get(
                "api/user/device/status",
                &[("deviceid", device_id), ("params", "switch")],
            )
            .await?;
        device_state(reply, None)
    }

    async fn send_state(&self, device_id: &str, state: &str) -> ApiResult<DeviceState> {
        let (appid, _) = self.app_credentials()?;
        let request = StatusRequest {
            deviceid: device_id,
            params: SwitchParams {
                switch: Some(state.to_string()),
            },
            appid,
            nonce: sign::nonce(),
            ts: chrono::Utc::now().timestamp(),
            version: API_VERSION,
        };
        let reply: CloudReply<StatusBody> = self.post("api/user/device/status", &request).await?;
        device_state(reply, Some(state))
    }

    async fn open_socket(&self, sink: UnboundedSender<SocketMessage>) -> ApiResult<()> {
        let session = self.session().await?;
        let (appid, _) = self.app_credentials()?;
        let url = Url::parse(&cloud::socket_url(&session.region))?;

        let cancel = CancellationToken::new();
        if let Some(previous) = self
            .socket
            .lock()
            .map_err(|_| ApiError::service_error("[remote] socket state poisoned"))?
            .replace(cancel.clone())
        {
            previous.cancel();
        }

        let link = SocketLink {
            url,
            session,
            appid: appid.to_string(),
            policy: ReconnectPolicy::default(),
        };
        tokio::spawn(link.run(sink, cancel));
        Ok(())
    }
}

/// Map a cloud status reply to a device state.
///
/// Cloud error codes are device-level answers, not transport failures, so
/// they are kept as [`DeviceState`] errors for the caller to inspect.
fn device_state(reply: CloudReply<StatusBody>, requested: Option<&str>) -> ApiResult<DeviceState> {
    match reply.into_result() {
        Ok(body) => Ok(DeviceState {
            state: body.params.switch.or_else(|| requested.map(ToString::to_string)),
            error: Some(0),
            msg: None,
        }),
        Err(EwelinkError::Cloud { code, msg }) => Ok(DeviceState::failed(code, msg)),
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl Connection for RemoteConnection {
    async fn activate_connection(&self) -> Option<Authentication> {
        if let Some(session) = self.session.read().await.clone() {
            return Some(Authentication::Account(session));
        }

        let session = absorb(TRANSPORT, "activateConnection", self.login()).await?;
        log::info!("[remote] eWeLink connection established, region [{}]", session.region);
        *self.session.write().await = Some(session.clone());
        self.gate.open();
        Some(Authentication::Account(session))
    }

    async fn request_devices(&self) -> Option<Vec<Device>> {
        absorb(TRANSPORT, "requestDevices", self.fetch_devices()).await
    }

    async fn request_device(&self, device_id: &str) -> Option<Device> {
        absorb(TRANSPORT, "requestDevice", self.fetch_device(device_id)).await
    }

    async fn request_device_state(&self, device_id: &str) -> Option<DeviceState> {
        absorb(TRANSPORT, "requestDeviceState", self.fetch_state(device_id)).await
    }

    async fn attempt_set_device_state(&self, device_id: &str, state: &str) -> Option<DeviceState> {
        absorb(
            TRANSPORT,
            "attemptSetDeviceState",
            self.send_state(device_id, state),
        )
        .await
    }

    async fn open_monitoring_socket(&self, sink: UnboundedSender<SocketMessage>) -> ApiResult<()> {
        self.open_socket(sink).await?;
        log::info!("[remote] Web socket for state monitoring opened");
        Ok(())
    }

    async fn close_monitoring_socket(&self) {
        let token = self.socket.lock().ok().and_then(|mut sock| sock.take());
        if let Some(token) = token {
            log::info!("[remote] Closing web socket for state monitoring");
            token.cancel();
        }
    }
}

struct SocketLink {
    url: Url,
    session: Session,
    appid: String,
    policy: ReconnectPolicy,
}

impl SocketLink {
    async fn run(self, sink: UnboundedSender<SocketMessage>, cancel: CancellationToken) {
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                res = self.connect_and_read(&sink, &cancel) => {
                    match res {
                        Ok(()) => {
                            log::info!("[remote] Web socket closed, reconnecting");
                            attempt = 0;
                        }
                        Err(err) => {
                            let delay = self.policy.backoff(attempt);
                            log::warn!("[remote] Web socket error: {err}, reconnecting in {delay:?}");
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => break,
                                () = tokio::time::sleep(delay) => {}
                            }
                            attempt = attempt.saturating_add(1);
                        }
                    }
                }
            }

            if sink.is_closed() {
                break;
            }
        }

        log::debug!("[remote] Web socket task exiting");
    }

    async fn connect_and_read(
        &self,
        sink: &UnboundedSender<SocketMessage>,
        cancel: &CancellationToken,
    ) -> ApiResult<()> {
        let (mut socket, _response) = connect_async(self.url.as_str()).await?;

        let hello = UserOnline::new(
            &self.session.at,
            &self.session.apikey,
            &self.appid,
            sign::nonce(),
            chrono::Utc::now().timestamp(),
        );
        socket
            .send(Message::Text(serde_json::to_string(&hello)?.into()))
            .await?;

        let mut ping = tokio::time::interval(self.policy.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = socket.close(None).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    socket.send(Message::Text(PING.into())).await?;
                }
                frame = socket.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if text.as_str() == PONG {
                                continue;
                            }
                            match serde_json::from_str::<SocketMessage>(&text) {
                                Ok(msg) => {
                                    if sink.send(msg).is_err() {
                                        return Ok(());
                                    }
                                }
                                Err(err) => log::debug!("[remote] Unparsable socket message: {err}"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ewelink::cloud::{CloudReply, StatusBody};

    use crate::connection::remote::{ReconnectPolicy, device_state};

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(10), Duration::from_secs(60));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn status_reply_maps_to_state() {
        let reply: CloudReply<StatusBody> =
            serde_json::from_str(r#"{"error": 0, "params": {"switch": "on"}}"#).unwrap();

        let state = device_state(reply, None).unwrap();
        assert_eq!(state.state.as_deref(), Some("on"));
        assert!(!state.is_error());
    }

    #[test]
    fn set_reply_echoes_requested_state() {
        let reply: CloudReply<StatusBody> = serde_json::from_str(r#"{"error": 0}"#).unwrap();

        let state = device_state(reply, Some("off")).unwrap();
        assert_eq!(state.state.as_deref(), Some("off"));
    }

    #[test]
    fn cloud_error_is_a_device_state() {
        let reply: CloudReply<StatusBody> =
            serde_json::from_str(r#"{"error": 503, "msg": "device offline"}"#).unwrap();

        let state = device_state(reply, None).unwrap();
        assert!(state.is_error());
        assert_eq!(state.msg.as_deref(), Some("device offline"));
    }
}
