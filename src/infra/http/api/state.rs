use std::sync::Arc;

use crate::application::items::ItemService;
use crate::infra::auth::TokenVerifier;

#[derive(Clone)]
pub struct ApiState {
    pub items: Arc<ItemService>,
    pub tokens: Arc<TokenVerifier>,
}
