pub mod environment;
pub mod error;
pub mod reveal;

pub use environment::{WebDriverEnvironment, WebHandle};
pub use error::{Result, WebDriverError};
pub use reveal::{default_chain, KeyboardEnd, ScrollContainer, ScrollLastItemIntoView, WindowScroll};
