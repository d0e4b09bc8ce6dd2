// src/browser/mod.rs

//! Browser session contract used by the table scraper, plus two sessions:
//! a live W3C WebDriver client and a static, already-loaded HTML page.

pub mod static_page;
pub mod webdriver;

use std::{
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::warn;

pub use static_page::StaticPage;
pub use webdriver::WebDriverSession;

/// Default timeout for [`Wait::Until`] reads.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum BrowserError {
    /// A waited read gave up before the element appeared.
    #[error("element not found after {timeout:?}: {xpath}")]
    NotFound { xpath: String, timeout: Duration },

    /// The driver answered a command with a WebDriver error object.
    #[error("webdriver error `{error}`: {message}")]
    Protocol { error: String, message: String },

    #[error("webdriver transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not start browser: {0}")]
    Launch(String),

    #[error("unexpected webdriver response: {0}")]
    Decode(String),
}

/// An exclusively owned, stateful page that can be queried by XPath.
pub trait Session {
    /// Text of the element at `xpath`, or `None` if the current DOM has no
    /// such element.
    fn find_text(&mut self, xpath: &str) -> Result<Option<String>, BrowserError>;

    /// Release the session and anything it keeps alive.
    fn quit(self) -> Result<(), BrowserError>
    where
        Self: Sized;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Query the DOM once; absence is `Ok(None)`.
    Immediate,
    /// Poll until the element shows up; absence at the deadline is
    /// [`BrowserError::NotFound`].
    Until(Duration),
}

/// Read the text of one cell.
pub fn read_cell<S: Session + ?Sized>(
    session: &mut S,
    xpath: &str,
    wait: Wait,
) -> Result<Option<String>, BrowserError> {
    let timeout = match wait {
        Wait::Immediate => return session.find_text(xpath),
        Wait::Until(timeout) => timeout,
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(text) = session.find_text(xpath)? {
            return Ok(Some(text));
        }
        let now = Instant::now();
        if now >= deadline {
            warn!(xpath, ?timeout, "failed xpath");
            return Err(BrowserError::NotFound {
                xpath: xpath.to_string(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
