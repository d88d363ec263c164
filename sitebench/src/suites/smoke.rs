use std::time::Duration;

use async_trait::async_trait;

use super::ThinkTime;
use crate::{
    client::RequestClient,
    error::Result,
    page::{AboutPage, HomePage, Page, PostsPage},
    runner::LoadTest,
    scenario::{Scenario, TestOptions},
    threshold::ThresholdSet,
};

/// Walks Home, Posts and About in order, checking each page's content.
#[derive(Debug, Clone)]
pub struct SmokeTest {
    client: RequestClient,
    home: HomePage,
    posts: PostsPage,
    about: AboutPage,
    scenario: Scenario,
    thresholds: ThresholdSet,
    think: ThinkTime,
}

impl SmokeTest {
    pub fn new(client: RequestClient, scenario: Scenario, thresholds: ThresholdSet) -> Self {
        Self {
            home: HomePage::new(client.clone()),
            posts: PostsPage::new(client.clone()),
            about: AboutPage::new(client.clone()),
            client,
            scenario,
            thresholds,
            think: ThinkTime::fixed(Duration::from_secs(1)),
        }
    }

    pub fn with_think_time(mut self, think: ThinkTime) -> Self {
        self.think = think;
        self
    }
}

#[async_trait]
impl LoadTest for SmokeTest {
    type Data = ();

    fn options(&self) -> TestOptions {
        TestOptions::builder()
            .scenarios(vec![self.scenario.clone()])
            .thresholds(self.thresholds.clone())
            .build()
    }

    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn iteration(&self, _: &()) {
        let home = self.home.load().await;
        self.client.check_response(&home, 200, "Home Page");
        self.home.verify_title(&home);
        self.home.verify_navigation(&home);
        self.think.pause().await;

        let posts = self.posts.load().await;
        self.client.check_response(&posts, 200, "Posts Page");
        self.posts.verify_posts_archive(&posts);
        self.think.pause().await;

        let about = self.about.load().await;
        self.client.check_response(&about, 200, "About Page");
        self.about.verify_about_content(&about);
        self.think.pause().await;
    }
}
