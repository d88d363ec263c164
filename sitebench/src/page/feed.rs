use async_trait::async_trait;

use super::{Page, PageInfo, all};
use crate::{
    client::{RequestClient, Response},
    macros::page,
    routes::Route,
};

/// The site's Atom/RSS feed.
#[page(Route::Feed)]
pub struct FeedPage {
    client: RequestClient,
}

impl FeedPage {
    /// XML content type and an Atom or RSS root element.
    ///
    /// A response without a content type fails the first check.
    pub fn verify_feed(&self, response: &Response) -> bool {
        let is_xml = response
            .content_type()
            .is_some_and(|ct| ct.contains("xml"));
        let has_root = response.body.contains("<feed") || response.body.contains("<rss");
        let checks = [
            self.client.checks().record("content type is XML", is_xml),
            self.client.checks().record("body is a feed", has_root),
        ];
        all(&checks)
    }
}

#[async_trait]
impl Page for FeedPage {
    fn verify(&self, response: &Response) -> bool {
        self.verify_feed(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::tests::client;

    #[test]
    fn atom_feed_verifies() {
        let feed = FeedPage::new(client());
        let response = Response::new("https://site.test/feed.xml", 200)
            .with_header("Content-Type", "application/atom+xml")
            .with_body(r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom">"#);
        assert!(feed.verify(&response));
    }

    #[test]
    fn missing_content_type_fails() {
        let feed = FeedPage::new(client());
        let response = Response::new("https://site.test/feed.xml", 200).with_body("<rss>");
        assert!(!feed.verify(&response));
        assert_eq!(feed.client().checks().get("content type is XML").unwrap().fails, 1);
        assert_eq!(feed.client().checks().get("body is a feed").unwrap().passes, 1);
    }
}
