use std::time::Duration;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use harvest_common::Selectors;
use harvest_core::Environment;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, WebDriverError};

/// How long to wait for the detail pane or the list after navigating.
const NAVIGATION_WAIT: Duration = Duration::from_secs(10);

/// A DOM element plus, for list rows, the href used to find it again after
/// the list re-renders underneath us.
#[derive(Debug, Clone)]
pub struct WebHandle {
    element: Element,
    anchor: Option<String>,
}

impl WebHandle {
    fn new(element: Element) -> Self {
        Self {
            element,
            anchor: None,
        }
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }
}

/// A live browser session on the inbox page, driven over WebDriver.
///
/// The session must already be authenticated (an existing browser profile
/// or a WebDriver server attached to a logged-in browser).
pub struct WebDriverEnvironment {
    client: Client,
    inbox_url: String,
    selectors: Selectors,
}

impl WebDriverEnvironment {
    pub async fn connect(webdriver_url: &str, inbox_url: &str, selectors: Selectors) -> Result<Self> {
        info!(webdriver_url, inbox_url, "Connecting to WebDriver");
        let client = ClientBuilder::native().connect(webdriver_url).await?;
        client.goto(inbox_url).await?;

        Ok(Self {
            client,
            inbox_url: inbox_url.to_string(),
            selectors,
        })
    }

    pub fn selectors(&self) -> &Selectors {
        &self.selectors
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Run a script in the page. Arguments are exposed as `arguments[n]`.
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        Ok(self.client.execute(script, args).await?)
    }

    /// End the WebDriver session.
    pub async fn shutdown(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }

    async fn find_in_page(&self, selector: &str) -> Result<Option<Element>> {
        match self.client.find(Locator::Css(selector)).await {
            Ok(element) => Ok(Some(element)),
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_within(&self, scope: &Element, selector: &str) -> Result<Option<Element>> {
        match scope.find(Locator::Css(selector)).await {
            Ok(element) => Ok(Some(element)),
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn wait_for(&self, selector: &str) -> Result<Element> {
        Ok(self
            .client
            .wait()
            .at_most(NAVIGATION_WAIT)
            .for_element(Locator::Css(selector))
            .await?)
    }

    async fn anchor_of(&self, row: &Element) -> Option<String> {
        let link = self.find_within(row, &self.selectors.item_link).await.ok()??;
        link.attr("href").await.ok().flatten()
    }

    async fn click_row(&self, row: &WebHandle) -> Result<()> {
        let err = match row.element.click().await {
            Ok(()) => return Ok(()),
            Err(e) => WebDriverError::from(e),
        };

        match (&err, &row.anchor) {
            (WebDriverError::Stale(_), Some(href)) => {
                debug!(href = href.as_str(), "Row went stale, finding it again by link");
                let selector = format!("a[href=\"{href}\"]");
                self.client.find(Locator::Css(&selector)).await?.click().await?;
                Ok(())
            }
            _ => Err(err),
        }
    }

    async fn visible_rows(&self) -> Result<Vec<WebHandle>> {
        let Some(container) = self.find_in_page(&self.selectors.list_container).await? else {
            return Ok(Vec::new());
        };
        let rows = container
            .find_all(Locator::Css(&self.selectors.list_item))
            .await?;

        let mut handles = Vec::with_capacity(rows.len());
        for element in rows {
            let anchor = self.anchor_of(&element).await;
            handles.push(WebHandle { element, anchor });
        }
        Ok(handles)
    }

    async fn return_to_list(&self) -> Result<()> {
        if let Err(e) = self.client.back().await {
            warn!(error = %e, "History back failed, reloading inbox");
            self.client.goto(&self.inbox_url).await?;
        }
        self.wait_for(&self.selectors.list_container).await?;
        Ok(())
    }
}

#[async_trait]
impl Environment for WebDriverEnvironment {
    type Handle = WebHandle;

    async fn is_ready(&mut self) -> harvest_common::Result<bool> {
        let Some(container) = self.find_in_page(&self.selectors.list_container).await? else {
            return Ok(false);
        };
        let rows = container
            .find_all(Locator::Css(&self.selectors.list_item))
            .await
            .map_err(WebDriverError::from)?;
        Ok(!rows.is_empty())
    }

    async fn list_visible_items(&mut self) -> harvest_common::Result<Vec<WebHandle>> {
        Ok(self.visible_rows().await?)
    }

    async fn open(&mut self, item: &WebHandle) -> harvest_common::Result<WebHandle> {
        self.click_row(item).await?;
        match self.wait_for(&self.selectors.detail_pane).await {
            Ok(pane) => Ok(WebHandle::new(pane)),
            Err(e) => {
                // The click may have navigated without rendering a pane.
                if let Err(back) = self.return_to_list().await {
                    warn!(error = %back, "Could not return to list after failed open");
                }
                Err(e.into())
            }
        }
    }

    async fn close(&mut self) -> harvest_common::Result<()> {
        Ok(self.return_to_list().await?)
    }

    async fn query_all(
        &mut self,
        handle: &WebHandle,
        selector: &str,
    ) -> harvest_common::Result<Vec<WebHandle>> {
        let found = handle
            .element
            .find_all(Locator::Css(selector))
            .await
            .map_err(WebDriverError::from)?;
        Ok(found.into_iter().map(WebHandle::new).collect())
    }

    async fn query_text(
        &mut self,
        handle: &WebHandle,
        selector: &str,
    ) -> harvest_common::Result<Option<String>> {
        let Some(element) = self.find_within(&handle.element, selector).await? else {
            return Ok(None);
        };
        let text = element.text().await.map_err(WebDriverError::from)?;
        Ok(Some(text).filter(|t| !t.trim().is_empty()))
    }

    async fn query_attribute(
        &mut self,
        handle: &WebHandle,
        selector: &str,
        attr: &str,
    ) -> harvest_common::Result<Option<String>> {
        let Some(element) = self.find_within(&handle.element, selector).await? else {
            return Ok(None);
        };
        Ok(element.attr(attr).await.map_err(WebDriverError::from)?)
    }
}
