use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use parley_types::api::AUTH_SUCCESS;
use parley_types::store::{LoginVerdict, Registration, Store};
use parley_types::{Credentials, Envelope, ErrorCode, Kind, SYSTEM_SENDER};

use crate::blocking;
use crate::broadcaster::Broadcaster;
use crate::registry::{Connection, ConnectionRegistry};

/// Promotes pending connections to authenticated ones.
///
/// A pending connection may only send `Register` or `LoginAttempt`; anything
/// else is answered with `ERROR:NOT_AUTHENTICATED` and dropped. Failed
/// attempts leave the connection pending, with no retry limit.
pub struct AuthGate {
    registry: Arc<dyn ConnectionRegistry>,
    store: Arc<dyn Store>,
    broadcaster: Broadcaster,
    /// Serializes the duplicate-name check with the bind that follows it.
    promotion: Arc<Mutex<()>>,
}

impl AuthGate {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        store: Arc<dyn Store>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            registry,
            store,
            broadcaster,
            promotion: Arc::new(Mutex::new(())),
        }
    }

    /// Handle one envelope from a pending connection.
    pub async fn handle(&self, conn: &Connection, envelope: Envelope) {
        match envelope.kind {
            Kind::Register | Kind::LoginAttempt => {
                let kind = envelope.kind;
                if let Err(code) = self.attempt(conn, &envelope).await {
                    reply(conn, kind, code.as_str());
                }
            }
            other => {
                warn!("{} sent {:?} before authenticating", conn.remote_addr, other);
                reply(conn, other, ErrorCode::NotAuthenticated.as_str());
            }
        }
    }

    async fn attempt(&self, conn: &Connection, envelope: &Envelope) -> Result<(), ErrorCode> {
        let kind = envelope.kind;
        let creds = Credentials::from_envelope(envelope)
            .ok()
            .filter(Credentials::is_complete)
            .ok_or(ErrorCode::InvalidInput)?;

        let username = creds.username.trim().to_string();
        if username == SYSTEM_SENDER {
            return Err(ErrorCode::InvalidInput);
        }

        let name = username.clone();
        let password = creds.password;
        let result = if kind == Kind::Register {
            blocking(&self.store, move |store| store.register_user(&name, &password))
                .await
                .map(|outcome| match outcome {
                    Registration::Created => Ok(()),
                    Registration::Conflict => Err(ErrorCode::UsernameExists),
                })
        } else {
            blocking(&self.store, move |store| store.login_user(&name, &password))
                .await
                .map(|verdict| match verdict {
                    LoginVerdict::Verified => Ok(()),
                    LoginVerdict::Rejected => Err(ErrorCode::InvalidCredentials),
                })
        };

        match result {
            Ok(Ok(())) => {}
            Ok(Err(code)) => {
                warn!("{:?} for {} from {} rejected: {}", kind, username, conn.remote_addr, code);
                return Err(code);
            }
            Err(e) => {
                error!("{:?} for {} failed in storage: {}", kind, username, e);
                return Err(ErrorCode::ServerError);
            }
        }

        self.promote(conn, &username, Some(kind)).await
    }

    /// Bind `username` to `conn` and run the post-auth sequence: session
    /// record, optional `SUCCESS` reply, stored profile, the profiles of
    /// everyone online, user list to this connection, then a user list
    /// rebroadcast.
    ///
    /// The reply is queued before the connection becomes visible to
    /// broadcasts, so it is always the first frame after the attempt.
    ///
    /// Fails with `AlreadyConnected` if another live connection holds the name.
    pub async fn promote(
        &self,
        conn: &Connection,
        username: &str,
        reply_kind: Option<Kind>,
    ) -> Result<(), ErrorCode> {
        // Detached so an aborted reader cannot strand a half-written session
        let binding = tokio::spawn(bind(
            self.promotion.clone(),
            self.registry.clone(),
            self.store.clone(),
            conn.clone(),
            username.to_string(),
            reply_kind,
        ));
        let conn = match binding.await {
            Ok(Ok(Some(conn))) => conn,
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(code)) => return Err(code),
            Err(e) => {
                error!("Binding {} to connection {} failed: {}", username, conn.id, e);
                return Err(ErrorCode::ServerError);
            }
        };

        info!("{} authenticated on connection {} from {}", username, conn.id, conn.remote_addr);

        let name = username.to_string();
        match blocking(&self.store, move |store| store.get_user_profile(&name)).await {
            Ok(Some(profile)) => {
                self.broadcaster.cache_profile(profile.clone());
                match serde_json::to_value(&profile) {
                    Ok(content) => {
                        conn.send(Envelope::system(Kind::ProfileUpdate, Some(username), content));
                    }
                    Err(e) => warn!("Failed to encode profile for {}: {}", username, e),
                }
            }
            Ok(None) => {}
            Err(e) => error!("Failed to load profile for {}: {}", username, e),
        }

        self.broadcaster.send_profiles_to(&conn);
        self.broadcaster.send_user_list_to(&conn);
        self.broadcaster.snapshot_user_list();
        Ok(())
    }
}

/// Duplicate check, session record, reply and registry bind, all under the
/// promotion lock. Returns the bound connection, or `None` if it closed first.
async fn bind(
    promotion: Arc<Mutex<()>>,
    registry: Arc<dyn ConnectionRegistry>,
    store: Arc<dyn Store>,
    conn: Connection,
    username: String,
    reply_kind: Option<Kind>,
) -> Result<Option<Connection>, ErrorCode> {
    let _promotion = promotion.lock().await;

    if let Some(existing) = registry.find_by_username(&username) {
        if existing.id != conn.id {
            warn!("{} is already connected from {}", username, existing.remote_addr);
            return Err(ErrorCode::AlreadyConnected);
        }
    }

    let session_id = conn.id.to_string();
    let (name, address) = (username.clone(), conn.remote_addr.to_string());
    if let Err(e) = blocking(&store, move |store| {
        store.create_session(&session_id, &name, &address)
    })
    .await
    {
        error!("Failed to record session for {}: {}", username, e);
    }

    if let Some(kind) = reply_kind {
        conn.send(Envelope::system(kind, Some(&username), json!(AUTH_SUCCESS)));
    }

    if !registry.authenticate(conn.id, &username) {
        // Closed while binding; the close path saw a pending connection
        let session_id = conn.id.to_string();
        if let Err(e) = blocking(&store, move |store| store.remove_session(&session_id)).await {
            error!("Failed to drop session {} for {}: {}", conn.id, username, e);
        }
        return Ok(None);
    }

    Ok(registry.get(conn.id))
}

fn reply(conn: &Connection, kind: Kind, content: &str) {
    let to = conn.username.as_deref();
    conn.send(Envelope::system(kind, to, json!(content)));
}
