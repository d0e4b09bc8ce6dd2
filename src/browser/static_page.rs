// src/browser/static_page.rs

use anyhow::{Context, Result};
use scraper::{ElementRef, Html};
use std::{fs, path::Path};

use super::{BrowserError, Session};

/// A parsed HTML document answering absolute positional XPaths such as
/// `/html/body/div/main/table/tbody/tr[3]/td[2]`. Only element steps with an
/// optional 1-based index are understood.
pub struct StaticPage {
    doc: Html,
}

impl StaticPage {
    pub fn parse(html: &str) -> Self {
        Self {
            doc: Html::parse_document(html),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let html =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::parse(&html))
    }

    fn resolve(&self, xpath: &str) -> Result<Option<ElementRef<'_>>, BrowserError> {
        let rest = xpath
            .strip_prefix('/')
            .ok_or_else(|| invalid(xpath, "not an absolute path"))?;
        let mut steps = rest.split('/').map(|s| parse_step(xpath, s));

        let root = self.doc.root_element();
        match steps.next() {
            Some(step) => {
                let (name, index) = step?;
                if root.value().name() != name || index != 1 {
                    return Ok(None);
                }
            }
            None => return Err(invalid(xpath, "empty path")),
        }

        let mut current = root;
        for step in steps {
            let (name, index) = step?;
            let next = current
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|el| el.value().name() == name)
                .nth(index - 1);
            match next {
                Some(el) => current = el,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

impl Session for StaticPage {
    fn find_text(&mut self, xpath: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.resolve(xpath)?.map(|el| {
            // collapse whitespace the way rendered text reads
            el.text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        }))
    }

    fn quit(self) -> Result<(), BrowserError> {
        Ok(())
    }
}

/// `td[3]` → (`td`, 3); `div` → (`div`, 1).
fn parse_step<'a>(xpath: &str, step: &'a str) -> Result<(&'a str, usize), BrowserError> {
    if step.is_empty() {
        return Err(invalid(xpath, "empty step"));
    }
    let Some(open) = step.find('[') else {
        return Ok((step, 1));
    };
    let index = step[open + 1..]
        .strip_suffix(']')
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|&n| n >= 1)
        .ok_or_else(|| invalid(xpath, "bad index"))?;
    Ok((&step[..open], index))
}

fn invalid(xpath: &str, why: &str) -> BrowserError {
    BrowserError::Protocol {
        error: "invalid selector".to_string(),
        message: format!("{}: {}", why, xpath),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div><p>first</p><p>second   line</p></div>
        <div><table><tr><td>2023</td><td> 6.4% </td></tr></table></div>
    </body></html>"#;

    #[test]
    fn test_positional_lookup() {
        let mut page = StaticPage::parse(PAGE);
        assert_eq!(
            page.find_text("/html/body/div[1]/p[2]").unwrap().as_deref(),
            Some("second line")
        );
        // the parser inserts tbody
        assert_eq!(
            page.find_text("/html/body/div[2]/table/tbody/tr/td[2]")
                .unwrap()
                .as_deref(),
            Some("6.4%")
        );
    }

    #[test]
    fn test_missing_element_is_none() {
        let mut page = StaticPage::parse(PAGE);
        assert_eq!(page.find_text("/html/body/div[3]").unwrap(), None);
        assert_eq!(
            page.find_text("/html/body/div[2]/table/tbody/tr[2]/td[1]")
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_bad_xpath_is_protocol_error() {
        let mut page = StaticPage::parse(PAGE);
        assert!(matches!(
            page.find_text("html/body"),
            Err(BrowserError::Protocol { .. })
        ));
        assert!(matches!(
            page.find_text("/html/body/div[0]"),
            Err(BrowserError::Protocol { .. })
        ));
    }
}
