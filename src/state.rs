use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::Config;
use crate::persistence::MeetingRepository;
use crate::signaling::SignalingService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub meetings: Arc<MeetingRepository>,
    pub signaling: Arc<SignalingService>,
}

impl AppState {
    pub fn new(
        config: Config,
        auth: AuthService,
        meetings: MeetingRepository,
        signaling: SignalingService,
    ) -> Self {
        Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            meetings: Arc::new(meetings),
            signaling: Arc::new(signaling),
        }
    }
}
