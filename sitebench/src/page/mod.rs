//! Page objects.
//!
//! Each page owns a clone of the run's [`RequestClient`] and knows two
//! things: how to load itself and how to tell whether what came back is the
//! right page. Loading never depends on verification, so a caller always gets
//! the response back even when a later `verify_*` fails.
//!
//! New pages are plain structs annotated with [`page`](crate::macros::page):
//!
//! ```rust, ignore
//! #[page(Route::Tags)]
//! pub struct TagsPage {
//!     client: RequestClient,
//! }
//!
//! #[async_trait]
//! impl Page for TagsPage {
//!     fn verify(&self, response: &Response) -> bool {
//!         self.client.assert_body_contains(response, "Tags")
//!     }
//! }
//! ```

mod about;
mod feed;
mod home;
mod posts;

pub use about::AboutPage;
pub use feed::FeedPage;
pub use home::HomePage;
pub use posts::PostsPage;

use async_trait::async_trait;

use crate::{
    client::{RequestClient, Response},
    routes::Route,
};

/// Identity of a page. Generated by the `#[page]` attribute.
pub trait PageInfo {
    /// Display name, e.g. `"Home"`.
    fn name(&self) -> &'static str;
    /// Canonical route loaded by [`Page::load`].
    fn route(&self) -> Route;
    fn client(&self) -> &RequestClient;
}

#[async_trait]
pub trait Page: PageInfo + Send + Sync {
    /// Issues the page's canonical GET.
    async fn load(&self) -> Response {
        self.client().get(self.route().path(), None).await
    }

    /// The page's default content checks, AND-ed.
    fn verify(&self, response: &Response) -> bool;
}

/// AND over already evaluated checks. Every check has been recorded by the
/// time this runs, so a failure early in the list hides nothing.
pub(crate) fn all(checks: &[bool]) -> bool {
    checks.iter().all(|ok| *ok)
}
