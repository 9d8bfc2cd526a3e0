pub mod filters;
pub mod models;
pub mod routes;
pub mod store;
pub mod validation;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use libris_db::Repository;
use libris_kernel::{settings::Settings, InitCtx, Module};

use models::Book;
use routes::BooksState;

/// Books catalogue module: CRUD, filtering and pagination over `/books/`
pub struct BooksModule {
    state: BooksState,
}

impl BooksModule {
    pub fn new(settings: &Settings, store: Arc<dyn Repository<Book>>) -> Self {
        Self {
            state: BooksState {
                store,
                pagination: settings.pagination.clone(),
                public_url: settings.server.public_url.clone(),
            },
        }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            default_limit = self.state.pagination.default_limit,
            max_limit = self.state.pagination.max_limit,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.state.clone())
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let books = self.state.store.count().await?;
        tracing::info!(module = self.name(), books, "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module(settings: &Settings, store: Arc<dyn Repository<Book>>) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(settings, store))
}
