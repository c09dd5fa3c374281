use scraper::Html;

use crate::model::SolutionId;
use crate::service::error::ServiceError;
use crate::{regex, select, Error, Result};

/// A single value scraped out of a page. `find` returns nothing when the
/// field is absent; `extract` turns that into a distinct error so callers can
/// tell markup drift apart from transport failures.
pub trait Extract: Sized {
    const FIELD: &'static str;

    fn find(html: &Html) -> Option<Self>;

    fn extract(html: &Html) -> Result<Self> {
        Self::find(html).ok_or_else(|| Error::new(ServiceError::Extract { field: Self::FIELD }))
    }
}

/// Anti-forgery key embedded in the submit form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfKey(String);

impl CsrfKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn for_tests(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl Extract for CsrfKey {
    const FIELD: &'static str = "csrf key";

    fn find(html: &Html) -> Option<Self> {
        html.select(select!("input[name=\"csrf_key\"]"))
            .next()
            .and_then(|input| input.value().attr("value"))
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_owned()))
    }
}

/// Public site key of the Turnstile widget on the submit page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnstileSitekey(String);

impl TurnstileSitekey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Extract for TurnstileSitekey {
    const FIELD: &'static str = "turnstile site key";

    fn find(html: &Html) -> Option<Self> {
        html.select(select!(".cf-turnstile"))
            .next()
            .and_then(|elem| elem.value().attr("data-sitekey"))
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_owned()))
    }
}

impl Extract for SolutionId {
    const FIELD: &'static str = "solution id";

    // The newest submission is the first row of the status table; its element
    // id looks like `solution-12345678`.
    fn find(html: &Html) -> Option<Self> {
        html.select(select!("table#status-table tbody tr"))
            .next()
            .and_then(|row| row.value().attr("id"))
            .and_then(|id| {
                regex!(r"^solution-(\d+)$")
                    .captures(id)
                    .and_then(|caps| caps.get(1))
            })
            .map(|m| Self::new(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SUBMIT_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <body>
    <form id="submit_form" method="post" action="/submit/1000">
      <input type="hidden" name="csrf_key" value="1a2b3c4d5e6f">
      <div class="cf-turnstile" data-sitekey="0x4AAAAAAABkMYinukE8nzYS"></div>
      <textarea name="source"></textarea>
    </form>
  </body>
</html>"#;

    static STATUS_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <body>
    <table id="status-table">
      <thead><tr><th>No.</th></tr></thead>
      <tbody>
        <tr id="solution-71234567"><td>Judging</td></tr>
        <tr id="solution-71234000"><td>Accepted</td></tr>
      </tbody>
    </table>
  </body>
</html>"#;

    fn assert_extract_fails<T: Extract + std::fmt::Debug>(html: &Html) {
        let err = T::extract(html).unwrap_err();
        match err.downcast_ref::<ServiceError>() {
            Some(ServiceError::Extract { field }) => assert_eq!(*field, T::FIELD),
            other => panic!("unexpected error kind : {:?}", other),
        }
    }

    #[test]
    fn test_extract_csrf_key() -> anyhow::Result<()> {
        let html = Html::parse_document(SUBMIT_PAGE);
        assert_eq!(CsrfKey::extract(&html)?.as_str(), "1a2b3c4d5e6f");
        Ok(())
    }

    #[test]
    fn test_extract_sitekey() -> anyhow::Result<()> {
        let html = Html::parse_document(SUBMIT_PAGE);
        assert_eq!(
            TurnstileSitekey::extract(&html)?.as_str(),
            "0x4AAAAAAABkMYinukE8nzYS"
        );
        Ok(())
    }

    #[test]
    fn test_extract_solution_id_takes_newest_row() -> anyhow::Result<()> {
        let html = Html::parse_document(STATUS_PAGE);
        assert_eq!(SolutionId::extract(&html)?.as_ref(), "71234567");
        Ok(())
    }

    #[test]
    fn test_extract_fails_on_missing_fields() {
        let html = Html::parse_document("<html><body><p>Service Unavailable</p></body></html>");
        assert_extract_fails::<CsrfKey>(&html);
        assert_extract_fails::<TurnstileSitekey>(&html);
        assert_extract_fails::<SolutionId>(&html);
    }

    #[test]
    fn test_extract_fails_on_empty_value() {
        let html = Html::parse_document(
            r#"<html><body><input name="csrf_key" value=""></body></html>"#,
        );
        assert_extract_fails::<CsrfKey>(&html);
    }
}
