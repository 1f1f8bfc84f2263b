use fpd_core::application::FinalityProviderApp;
use std::sync::Arc;

#[derive(Clone)]
pub struct RpcState {
    pub app: Arc<FinalityProviderApp>,
    pub rpc_token: Option<String>,
}
