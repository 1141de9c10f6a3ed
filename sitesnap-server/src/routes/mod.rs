pub mod meta;
pub mod read;
pub mod upload;

use serde::Serialize;

/// Plain `{ok:true}` acknowledgment.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for OkResponse {
    fn default() -> Self {
        Self::new()
    }
}
