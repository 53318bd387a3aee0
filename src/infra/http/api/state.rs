use std::sync::Arc;

use crate::application::{profile::ProfileResolver, relay::AvatarRelay};

#[derive(Clone)]
pub struct ApiState {
    pub relay: Arc<AvatarRelay>,
    pub resolver: Arc<ProfileResolver>,
}
