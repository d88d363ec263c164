use async_trait::async_trait;

use super::{Page, PageInfo};
use crate::{
    client::{RequestClient, Response},
    macros::page,
    routes::Route,
};

#[page(Route::Posts)]
pub struct PostsPage {
    client: RequestClient,
}

impl PostsPage {
    pub fn verify_posts_archive(&self, response: &Response) -> bool {
        self.client.assert_body_contains(response, "Posts")
    }

    /// The archive lists at least the oldest known post.
    pub fn verify_has_posts(&self, response: &Response) -> bool {
        self.client.assert_body_contains(response, "The King is Dead")
    }
}

#[async_trait]
impl Page for PostsPage {
    fn verify(&self, response: &Response) -> bool {
        self.verify_posts_archive(response)
    }
}
