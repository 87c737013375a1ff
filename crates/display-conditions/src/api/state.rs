//! 路由共享状态

use std::sync::Arc;

use crate::memory::PostCatalog;
use crate::store::RuleSetStore;

/// Axum 应用共享状态
#[derive(Clone, Default)]
pub struct AppState {
    pub store: RuleSetStore,
    /// 异步评估时查询文章详情用的目录
    pub catalog: Arc<PostCatalog>,
    /// 对所有请求记录逐行追踪
    pub trace_evaluations: bool,
}

impl AppState {
    pub fn new(store: RuleSetStore, catalog: PostCatalog) -> Self {
        Self {
            store,
            catalog: Arc::new(catalog),
            trace_evaluations: false,
        }
    }

    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace_evaluations = enabled;
        self
    }
}
