use async_trait::async_trait;

use super::{Page, PageInfo, all};
use crate::{
    client::{RequestClient, Response},
    macros::page,
    routes::Route,
};

const TITLE: &str = "QAbbalah";
const NAVIGATION: [&str; 4] = ["Posts", "Categories", "Tags", "About"];

#[page(Route::Home)]
pub struct HomePage {
    client: RequestClient,
}

impl HomePage {
    pub fn verify_title(&self, response: &Response) -> bool {
        self.client.assert_body_contains(response, TITLE)
    }

    /// Every navigation entry must be present.
    pub fn verify_navigation(&self, response: &Response) -> bool {
        let checks = NAVIGATION.map(|link| self.client.assert_body_contains(response, link));
        all(&checks)
    }

    pub async fn click_posts(&self) -> Response {
        self.client.get(Route::Posts.path(), None).await
    }

    pub async fn click_about(&self) -> Response {
        self.client.get(Route::About.path(), None).await
    }
}

#[async_trait]
impl Page for HomePage {
    fn verify(&self, response: &Response) -> bool {
        let checks = [
            self.verify_title(response),
            self.verify_navigation(response),
        ];
        all(&checks)
    }
}
