//! Admin REST API for stored imposters and stubs.
//!
//! This module provides a Mountebank-compatible REST API for:
//! - Creating, deleting, and listing imposters
//! - Managing stubs within imposters
//! - Clearing recorded requests and proxy responses
//! - Resolving requests on behalf of protocol servers
//!
//! The API listens on a configurable port (default: 2525).

mod handlers;
mod router;
mod server;
mod types;

pub use router::route_request;
pub use server::AdminApiServer;

use crate::imposters::ImpostersRepository;
use crate::matcher::RequestMatcher;
use crate::resolver::ResponseResolver;
use crate::validation::StubValidator;
use std::sync::Arc;

/// Everything the admin handlers need, shared across connections
pub struct AdminState {
    pub repo: Arc<dyn ImpostersRepository>,
    pub validator: Arc<dyn StubValidator>,
    pub resolver: ResponseResolver,
}

impl AdminState {
    pub fn new(
        repo: Arc<dyn ImpostersRepository>,
        validator: Arc<dyn StubValidator>,
        matcher: Arc<dyn RequestMatcher>,
    ) -> Self {
        let resolver = ResponseResolver::new(Arc::clone(&repo), matcher);
        Self {
            repo,
            validator,
            resolver,
        }
    }
}
