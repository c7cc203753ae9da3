use serde::{Deserialize, Serialize};

/// JWT claims: the verified identity a connection must present before
/// any signaling event is processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id, stable across reconnects
    pub name: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}
