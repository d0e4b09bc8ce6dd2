// src/browser/webdriver.rs

use reqwest::{blocking::Client, Method};
use serde_json::{json, Value};
use std::{
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{BrowserError, Session};
use crate::config::Settings;

/// W3C key under which element references are returned.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const READY_TIMEOUT: Duration = Duration::from_secs(10);
const READY_POLL: Duration = Duration::from_millis(100);

/// A Chrome session driven through a locally spawned WebDriver process.
///
/// The session is released by [`Session::quit`]; if the value is dropped
/// first, `Drop` does the same teardown so the driver never outlives it.
pub struct WebDriverSession {
    http: Client,
    base: Url,
    session_id: Option<String>,
    driver: Option<Child>,
}

impl WebDriverSession {
    /// Spawn the driver from `settings`, wait for it, and open a browser.
    #[instrument(level = "info", skip(settings), fields(driver = %settings.chrome_driver_path.display()))]
    pub fn launch(settings: &Settings) -> Result<Self, BrowserError> {
        let child = Command::new(&settings.chrome_driver_path)
            .arg(format!("--port={}", settings.driver_port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                BrowserError::Launch(format!(
                    "spawning {}: {}",
                    settings.chrome_driver_path.display(),
                    e
                ))
            })?;

        let base = Url::parse(&format!("http://127.0.0.1:{}/", settings.driver_port))
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // from here on Drop kills the driver if anything below fails
        let mut session = Self {
            http: Client::new(),
            base,
            session_id: None,
            driver: Some(child),
        };
        session.wait_ready()?;
        session.open(&settings.browser_args)?;
        info!(session = ?session.session_id, "browser session open");
        Ok(session)
    }

    /// Spawn, open and navigate in one step.
    pub fn launch_at(settings: &Settings, url: &str) -> Result<Self, BrowserError> {
        let mut session = Self::launch(settings)?;
        session.goto(url)?;
        Ok(session)
    }

    pub fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        debug!(url, "navigating");
        self.session_command(Method::POST, "url", Some(json!({ "url": url })))?;
        Ok(())
    }

    fn wait_ready(&mut self) -> Result<(), BrowserError> {
        let deadline = Instant::now() + READY_TIMEOUT;
        loop {
            if let Some(child) = self.driver.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(BrowserError::Launch(format!(
                        "driver exited early with {}",
                        status
                    )));
                }
            }
            match self.command(Method::GET, "status", None) {
                Ok(v) if v["ready"].as_bool() == Some(true) => return Ok(()),
                Ok(_) | Err(_) if Instant::now() < deadline => thread::sleep(READY_POLL),
                Ok(_) | Err(_) => {
                    return Err(BrowserError::Launch(format!(
                        "driver not ready after {:?}",
                        READY_TIMEOUT
                    )))
                }
            }
        }
    }

    fn open(&mut self, args: &[String]) -> Result<(), BrowserError> {
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });
        let v = self.command(Method::POST, "session", Some(caps))?;
        let id = v["sessionId"]
            .as_str()
            .ok_or_else(|| BrowserError::Decode(format!("no sessionId in {}", v)))?;
        self.session_id = Some(id.to_string());
        Ok(())
    }

    /// Send one command and unwrap the `value` member of the reply.
    fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| BrowserError::Decode(format!("bad command path {}: {}", path, e)))?;
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send()?;
        let ok = resp.status().is_success();
        let reply: Value = resp.json()?;
        unwrap_reply(ok, reply)
    }

    fn session_command(
        &self,
        method: Method,
        tail: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let id = self
            .session_id
            .as_deref()
            .ok_or_else(|| BrowserError::Decode("no open session".to_string()))?;
        self.command(method, &format!("session/{}/{}", id, tail), body)
    }

    /// Close the window, end the session and stop the driver. Idempotent;
    /// returns the first failure but always attempts every step.
    fn release(&mut self) -> Result<(), BrowserError> {
        let mut first_err = None;

        if let Some(id) = self.session_id.clone() {
            if let Err(e) = self.session_command(Method::DELETE, "window", None) {
                warn!(error = %e, "closing window failed");
                first_err.get_or_insert(e);
            }
            if let Err(e) = self.command(Method::DELETE, &format!("session/{}", id), None) {
                warn!(error = %e, "deleting session failed");
                first_err.get_or_insert(e);
            }
            self.session_id = None;
        }

        if let Some(mut child) = self.driver.take() {
            stop_driver(&mut child);
            info!("browser session released");
        }

        first_err.map_or(Ok(()), Err)
    }
}

impl Session for WebDriverSession {
    fn find_text(&mut self, xpath: &str) -> Result<Option<String>, BrowserError> {
        let found = self.session_command(
            Method::POST,
            "element",
            Some(json!({ "using": "xpath", "value": xpath })),
        );
        let element = match found {
            Ok(v) => element_id(&v)
                .ok_or_else(|| BrowserError::Decode(format!("no element reference in {}", v)))?,
            Err(BrowserError::Protocol { error, .. }) if error == "no such element" => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };

        let text = self.session_command(Method::GET, &format!("element/{}/text", element), None)?;
        match text {
            Value::String(s) => Ok(Some(s)),
            other => Err(BrowserError::Decode(format!("element text was {}", other))),
        }
    }

    fn quit(mut self) -> Result<(), BrowserError> {
        self.release()
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "browser release on drop failed");
        }
    }
}

fn element_id(value: &Value) -> Option<String> {
    value[ELEMENT_KEY].as_str().map(str::to_string)
}

/// Take the `value` member out of a reply; a failed status turns it into a
/// wire error.
fn unwrap_reply(ok: bool, mut reply: Value) -> Result<Value, BrowserError> {
    let value = match reply.get_mut("value") {
        Some(v) => v.take(),
        None => {
            return Err(BrowserError::Decode(format!(
                "no value member in {}",
                reply
            )))
        }
    };
    if ok {
        Ok(value)
    } else {
        Err(wire_error(&value))
    }
}

/// Kill and reap the driver process. Both steps tolerate a process that
/// has already exited.
fn stop_driver(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(error = %e, "driver already gone");
    }
    if let Err(e) = child.wait() {
        debug!(error = %e, "reaping driver failed");
    }
}

fn wire_error(value: &Value) -> BrowserError {
    BrowserError::Protocol {
        error: value["error"].as_str().unwrap_or("unknown error").to_string(),
        message: value["message"].as_str().unwrap_or_default().to_string(),
    }
}
