// The browser seen through the narrow set of capabilities the traversal
// needs. One implementation per automation backend; the core never touches
// a driver directly.
//
// Reveal ("scroll for more") is not a method here: it is modelled as an
// ordered chain of strategies in `reveal.rs`, each of which drives an
// `Environment`.

use async_trait::async_trait;
use harvest_common::Result;

#[async_trait]
pub trait Environment: Send {
    /// Opaque reference to a list row, an opened conversation, or a node
    /// inside either.
    type Handle: Clone + Send + Sync + std::fmt::Debug;

    /// Whether the conversation list has rendered and can be enumerated.
    async fn is_ready(&mut self) -> Result<bool>;

    /// Rows currently rendered in the virtualized list, top to bottom.
    async fn list_visible_items(&mut self) -> Result<Vec<Self::Handle>>;

    /// Navigate into a row. Only one conversation is open at a time.
    async fn open(&mut self, item: &Self::Handle) -> Result<Self::Handle>;

    /// Return from the open conversation to the list.
    async fn close(&mut self) -> Result<()>;

    /// All descendants of `handle` matching `selector`, in document order.
    async fn query_all(&mut self, handle: &Self::Handle, selector: &str)
        -> Result<Vec<Self::Handle>>;

    /// Text of the first descendant matching `selector`, if any.
    async fn query_text(&mut self, handle: &Self::Handle, selector: &str)
        -> Result<Option<String>>;

    /// Attribute of the first descendant matching `selector`, if both exist.
    async fn query_attribute(
        &mut self,
        handle: &Self::Handle,
        selector: &str,
        attr: &str,
    ) -> Result<Option<String>>;
}
