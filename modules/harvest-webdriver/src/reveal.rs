// Concrete reveal strategies for virtualized inbox lists. Each one reports
// whether the scroll position actually moved, so the chain can tell a
// strategy that worked from one that had nowhere left to go.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::key::Key;
use fantoccini::Locator;
use harvest_common::{Result, Selectors};
use harvest_core::{RevealChain, RevealStrategy};
use serde_json::{json, Value};

use crate::environment::WebDriverEnvironment;
use crate::error::WebDriverError;

/// Time for the browser to apply a key-driven scroll before re-reading it.
const KEY_SCROLL_GRACE: Duration = Duration::from_millis(150);

const SCROLL_CONTAINER_JS: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) return null;
const before = el.scrollTop;
el.scrollTop = el.scrollHeight;
return el.scrollTop > before;
"#;

const SCROLL_LAST_ROW_JS: &str = r#"
const container = document.querySelector(arguments[0]);
const rows = container ? container.querySelectorAll(arguments[1]) : [];
if (!rows.length) return null;
const before = container.scrollTop;
rows[rows.length - 1].scrollIntoView({ block: "end" });
return container.scrollTop > before;
"#;

const SCROLL_TOP_JS: &str = r#"
const el = document.querySelector(arguments[0]);
return el ? el.scrollTop : null;
"#;

const WINDOW_SCROLL_JS: &str = r#"
const before = window.scrollY;
window.scrollTo(0, document.body.scrollHeight);
return window.scrollY > before;
"#;

/// Interpret a script result as "moved". `null` means the target was not
/// on the page, which counts as not moving.
fn moved(value: Value) -> std::result::Result<bool, WebDriverError> {
    match value {
        Value::Bool(moved) => Ok(moved),
        Value::Null => Ok(false),
        other => Err(WebDriverError::Script(other.to_string())),
    }
}

/// Set the list container's `scrollTop` to its full height.
pub struct ScrollContainer {
    container: String,
}

impl ScrollContainer {
    pub fn new(selectors: &Selectors) -> Self {
        Self {
            container: selectors.list_container.clone(),
        }
    }
}

#[async_trait]
impl RevealStrategy<WebDriverEnvironment> for ScrollContainer {
    fn name(&self) -> &str {
        "scroll-container"
    }

    async fn reveal(&self, env: &mut WebDriverEnvironment) -> Result<bool> {
        let result = env.execute(SCROLL_CONTAINER_JS, vec![json!(self.container)]).await?;
        Ok(moved(result)?)
    }
}

/// Scroll the last rendered row into view, which triggers lists that load
/// on intersection rather than on scroll position.
pub struct ScrollLastItemIntoView {
    container: String,
    item: String,
}

impl ScrollLastItemIntoView {
    pub fn new(selectors: &Selectors) -> Self {
        Self {
            container: selectors.list_container.clone(),
            item: selectors.list_item.clone(),
        }
    }
}

#[async_trait]
impl RevealStrategy<WebDriverEnvironment> for ScrollLastItemIntoView {
    fn name(&self) -> &str {
        "scroll-last-row"
    }

    async fn reveal(&self, env: &mut WebDriverEnvironment) -> Result<bool> {
        let result = env
            .execute(SCROLL_LAST_ROW_JS, vec![json!(self.container), json!(self.item)])
            .await?;
        Ok(moved(result)?)
    }
}

/// Send End to the list container.
pub struct KeyboardEnd {
    container: String,
}

impl KeyboardEnd {
    pub fn new(selectors: &Selectors) -> Self {
        Self {
            container: selectors.list_container.clone(),
        }
    }

    async fn scroll_top(
        &self,
        env: &WebDriverEnvironment,
    ) -> std::result::Result<Option<f64>, WebDriverError> {
        let value = env.execute(SCROLL_TOP_JS, vec![json!(self.container)]).await?;
        Ok(value.as_f64())
    }
}

#[async_trait]
impl RevealStrategy<WebDriverEnvironment> for KeyboardEnd {
    fn name(&self) -> &str {
        "keyboard-end"
    }

    async fn reveal(&self, env: &mut WebDriverEnvironment) -> Result<bool> {
        let Some(before) = self.scroll_top(env).await? else {
            return Ok(false);
        };

        let end: char = Key::End.into();
        env.client()
            .find(Locator::Css(&self.container))
            .await
            .map_err(WebDriverError::from)?
            .send_keys(&end.to_string())
            .await
            .map_err(WebDriverError::from)?;
        tokio::time::sleep(KEY_SCROLL_GRACE).await;

        let after = self.scroll_top(env).await?;
        Ok(after.is_some_and(|after| after > before))
    }
}

/// Scroll the whole window to the bottom, for layouts where the page itself
/// is the scroll container.
pub struct WindowScroll;

#[async_trait]
impl RevealStrategy<WebDriverEnvironment> for WindowScroll {
    fn name(&self) -> &str {
        "window-scroll"
    }

    async fn reveal(&self, env: &mut WebDriverEnvironment) -> Result<bool> {
        let result = env.execute(WINDOW_SCROLL_JS, vec![]).await?;
        Ok(moved(result)?)
    }
}

/// Container scroll first, then the progressively blunter fallbacks.
pub fn default_chain(selectors: &Selectors) -> RevealChain<WebDriverEnvironment> {
    RevealChain::new()
        .with(ScrollContainer::new(selectors))
        .with(ScrollLastItemIntoView::new(selectors))
        .with(KeyboardEnd::new(selectors))
        .with(WindowScroll)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_results_map_to_movement() {
        assert!(moved(json!(true)).unwrap());
        assert!(!moved(json!(false)).unwrap());
        assert!(!moved(Value::Null).unwrap());
        assert!(matches!(moved(json!(42)), Err(WebDriverError::Script(_))));
    }

    #[test]
    fn strategies_take_selectors_from_table() {
        let selectors = Selectors {
            list_container: "#threads".into(),
            list_item: "#threads > li".into(),
            ..Default::default()
        };
        assert_eq!(ScrollContainer::new(&selectors).container, "#threads");
        let last = ScrollLastItemIntoView::new(&selectors);
        assert_eq!(last.item, "#threads > li");
    }

    #[test]
    fn default_chain_has_every_fallback() {
        assert_eq!(default_chain(&Selectors::default()).len(), 4);
    }
}
