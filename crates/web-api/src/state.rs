use std::sync::Arc;

use application::RealtimeServices;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub services: RealtimeServices,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(services: RealtimeServices, jwt_service: Arc<JwtService>) -> Self {
        Self {
            services,
            jwt_service,
        }
    }
}
