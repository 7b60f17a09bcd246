//! # Template Source
//!
//! Serves template text stored in the database to a template engine. The
//! engine asks the source to resolve a name, checks the result for staleness,
//! and reads its body:
//!
//! ```text
//! find_template_source(name) -> Option<descriptor>
//! last_modified(descriptor)  -> epoch millis
//! reader(descriptor)         -> character stream
//! reset_state()              -> drop cached handles
//! ```
//!
//! [`RemoteTemplateSource`] implements this over three prepared calls in one
//! of two shapes, see [`SourceVariant`].

mod locator;
mod remote;

pub use locator::{LocationDescriptor, TemplateLocator};
pub use remote::{RemoteTemplateSource, SourceVariant};

use crate::error::TemplateSourceResult;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Template body handed to the engine
pub type TemplateReader = Box<dyn AsyncRead + Send + Unpin>;

/// The loader contract a template engine consumes.
#[async_trait]
pub trait TemplateLoader: Send + Sync {
    /// Opaque handle for a resolved template
    type Source: Send + Sync;

    /// `Ok(None)` when no template has this name
    async fn find_template_source(&self, name: &str) -> TemplateSourceResult<Option<Self::Source>>;

    async fn last_modified(&self, source: &Self::Source) -> TemplateSourceResult<i64>;

    async fn reader(&self, source: &Self::Source) -> TemplateSourceResult<TemplateReader>;

    /// Nothing to release per template; handles are shared
    async fn close_template_source(&self, _source: Self::Source) -> TemplateSourceResult<()> {
        Ok(())
    }

    async fn reset_state(&self);
}
