use async_trait::async_trait;

use super::{Page, PageInfo, all};
use crate::{
    client::{RequestClient, Response},
    macros::page,
    routes::Route,
};

#[page(Route::About)]
pub struct AboutPage {
    client: RequestClient,
}

impl AboutPage {
    pub fn verify_about_content(&self, response: &Response) -> bool {
        self.client.assert_body_contains(response, "About")
    }

    pub fn verify_social_links(&self, response: &Response) -> bool {
        let checks = [
            self.client.assert_body_contains(response, "linkedin"),
            self.client.assert_body_contains(response, "github"),
        ];
        all(&checks)
    }
}

#[async_trait]
impl Page for AboutPage {
    fn verify(&self, response: &Response) -> bool {
        self.verify_about_content(response)
    }
}
