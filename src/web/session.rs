use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;

use crate::state::{SessionData, SessionId, SessionStore};

pub const COOKIE_NAME: &str = "pixel_session";

/// The session document of one request, loaded once and saved once.
pub struct Session {
    id: SessionId,
    is_new: bool,
    pub data: SessionData,
}

impl Session {
    /// Resume the session named by the cookie, or start a fresh one when the
    /// cookie is missing or its session is unknown.
    pub fn load(store: &dyn SessionStore, headers: &HeaderMap) -> Self {
        if let Some(id) = cookie_session_id(headers) {
            if let Some(data) = store.load(&id) {
                return Self {
                    id,
                    is_new: false,
                    data,
                };
            }
        }
        Self {
            id: SessionId::generate(),
            is_new: true,
            data: SessionData::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Persist the document and attach the cookie to a new session.
    ///
    /// A new session with nothing in it is not stored; a resumed session
    /// that became empty is dropped from the store.
    pub fn save(self, store: &dyn SessionStore, mut response: Response) -> Response {
        if self.data.is_empty() {
            if !self.is_new {
                store.remove(&self.id);
            }
            return response;
        }
        store.save(&self.id, self.data);
        if self.is_new {
            match HeaderValue::from_str(&set_cookie_value(&self.id)) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => log::warn!("cannot encode session cookie: {e}"),
            }
        }
        response
    }
}

pub fn set_cookie_value(id: &SessionId) -> String {
    format!("{COOKIE_NAME}={id}; Path=/; HttpOnly; SameSite=Lax")
}

fn cookie_session_id(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == COOKIE_NAME)
        .and_then(|(_, value)| SessionId::parse(value))
}
