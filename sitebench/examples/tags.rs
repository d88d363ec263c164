use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sitebench::{
    Config, LoadProfile, LoadTest, Page, PageInfo, RequestClient, Response, Result, Route,
    Runner, Scenario, TestOptions, ThresholdSet, VuExecutor, macros::page, traffic,
};

#[page(Route::Tags)]
pub struct TagsPage {
    client: RequestClient,
}

#[async_trait]
impl Page for TagsPage {
    fn verify(&self, response: &Response) -> bool {
        self.client.assert_body_contains(response, "Tags")
    }
}

struct TagsTest {
    page: TagsPage,
}

#[async_trait]
impl LoadTest for TagsTest {
    type Data = ();

    fn options(&self) -> TestOptions {
        TestOptions::builder()
            .scenarios(vec![
                Scenario::builder()
                    .name("tags")
                    .profile(LoadProfile::constant(5, Duration::from_secs(10)))
                    .build(),
            ])
            .thresholds(
                ThresholdSet::parse([("http_req_duration", ["p(95)<800"])])
                    .expect("valid thresholds"),
            )
            .build()
    }

    async fn setup(&self) -> Result<()> {
        sitebench::probe_target(self.page.client()).await
    }

    async fn iteration(&self, _: &()) {
        let response = self.page.load().await;
        self.page
            .client()
            .check_response(&response, 200, self.page.name());
        self.page.verify(&response);
        traffic::think(Duration::from_millis(500), Duration::from_secs(1)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::default();
    let runner = Runner::new(VuExecutor::default())?;

    // Build the client once; every page and VU shares it
    let page = TagsPage::new(runner.http_client(&config)?);
    let outcome = runner.run(Arc::new(TagsTest { page })).await?;
    println!("thresholds passed: {}", outcome.passed());
    Ok(())
}
