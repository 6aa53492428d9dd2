use std::path::PathBuf;

use crate::store::Store;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<Store>,
    /// Token of the most recent login, mirrored here so a driving UI that
    /// does not persist the token can still call `auth.whoami` / `auth.logout`.
    pub session: Option<String>,
}

impl AppState {
    pub fn new() -> AppState {
        AppState {
            workspace: None,
            store: None,
            session: None,
        }
    }
}
