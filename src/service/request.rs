use std::collections::HashMap;

use anyhow::Context as _;
use lazy_static::lazy_static;
use maplit::hashmap;
use reqwest::blocking::Response;
use reqwest::header::SET_COOKIE;
use reqwest::{Method, StatusCode, Url};
use scraper::Html;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::model::{CodeOpen, ProblemId, SourceFile};
use crate::progress::Report;
use crate::service::scrape::CsrfKey;
use crate::service::session::Session;
use crate::service::solver::{CaptchaToken, SolverTask};
use crate::Result;

lazy_static! {
    pub static ref BASE_URL: Url = Url::parse("https://www.acmicpc.net").unwrap();
}

pub fn submit_url(problem_id: &ProblemId) -> Result<Url> {
    let path = format!("/submit/{}", problem_id);
    BASE_URL
        .join(&path)
        .context(format!("Could not parse url path : {}", path))
}

/// The assembled submit-post body. Only constructible with both an extracted
/// csrf key and a solved captcha token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitForm {
    problem_id: ProblemId,
    language_id: u32,
    code_open: CodeOpen,
    source: String,
    csrf_key: CsrfKey,
    captcha_token: CaptchaToken,
}

impl SubmitForm {
    pub fn new(
        problem_id: ProblemId,
        language_id: u32,
        code_open: CodeOpen,
        source: &SourceFile,
        csrf_key: CsrfKey,
        captcha_token: CaptchaToken,
    ) -> Self {
        Self {
            problem_id,
            language_id,
            code_open,
            source: source.text().to_owned(),
            csrf_key,
            captcha_token,
        }
    }

    pub fn problem_id(&self) -> &ProblemId {
        &self.problem_id
    }

    fn params(&self) -> HashMap<&'static str, String> {
        hashmap!(
            "problem_id" => self.problem_id.to_string(),
            "language" => self.language_id.to_string(),
            "code_open" => self.code_open.as_form_value().to_owned(),
            "source" => self.source.clone(),
            "csrf_key" => self.csrf_key.as_str().to_owned(),
            "cf-turnstile-response" => self.captcha_token.as_str().to_owned(),
        )
    }
}

/// Closed set of outbound calls. Each variant computes its request shape
/// deterministically; the network round trip happens in `Execute` only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Main,
    Submit { problem_id: ProblemId },
    SubmitPost { form: SubmitForm },
    SolverCreate { page_url: Url, sitekey: String },
    SolverPoll { task: SolverTask },
}

impl Page {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Main => "main-page",
            Self::Submit { .. } => "submit-page",
            Self::SubmitPost { .. } => "submit-post",
            Self::SolverCreate { .. } => "solver-create",
            Self::SolverPoll { .. } => "solver-poll",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Self::SubmitPost { .. } => Method::POST,
            _ => Method::GET,
        }
    }

    pub fn url(&self, conf: &Config) -> Result<Url> {
        match self {
            Self::Main => Ok(BASE_URL.clone()),
            Self::Submit { problem_id } => submit_url(problem_id),
            Self::SubmitPost { form } => submit_url(form.problem_id()),
            Self::SolverCreate { page_url, sitekey } => Url::parse_with_params(
                &format!("{}/turnstile", conf.solver().base_url()),
                &[("url", page_url.as_str()), ("sitekey", sitekey.as_str())],
            )
            .context("Could not parse solver create-task url"),
            Self::SolverPoll { task } => Url::parse_with_params(
                &format!("{}/result", conf.solver().base_url()),
                &[("id", task.as_str())],
            )
            .context("Could not parse solver poll-result url"),
        }
    }

    pub fn form_params(&self) -> Option<HashMap<&'static str, String>> {
        match self {
            Self::SubmitPost { form } => Some(form.params()),
            _ => None,
        }
    }

    /// Pages that must carry session cookies.
    pub fn needs_session(&self) -> bool {
        match self {
            Self::Submit { .. } | Self::SubmitPost { .. } => true,
            _ => false,
        }
    }

    pub fn accepts(&self, status: StatusCode) -> bool {
        match self {
            // a successful submit redirects to the status page
            Self::SubmitPost { .. } => status.is_success() || status == StatusCode::FOUND,
            _ => status.is_success(),
        }
    }

    pub fn rejects(&self, status: StatusCode) -> bool {
        status.is_redirection() || status.is_client_error()
    }
}

/// Response wrapper decoupled from the transport, so request shaping and the
/// whole workflow stay testable without a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    status: StatusCode,
    cookies: Vec<(String, String)>,
    body: String,
}

impl RawResponse {
    pub fn new(status: StatusCode, cookies: Vec<(String, String)>, body: impl Into<String>) -> Self {
        Self {
            status,
            cookies,
            body: body.into(),
        }
    }

    pub fn read(res: Response) -> Result<Self> {
        let status = res.status();
        let cookies = res
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|val| {
                val.to_str()
                    .ok()
                    .and_then(|s| cookie::Cookie::parse(s.to_owned()).ok())
            })
            .map(|c| (c.name().to_owned(), c.value().to_owned()))
            .collect();
        let body = res.text().context("Could not read response body")?;
        Ok(Self {
            status,
            cookies,
            body,
        })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn html(&self) -> Html {
        Html::parse_document(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).context("Could not decode response as json")
    }
}

/// Single seam through which every endpoint call goes.
pub trait Execute {
    fn execute(
        &mut self,
        page: &Page,
        session: Option<&Session>,
        rep: &mut dyn Report,
    ) -> Result<RawResponse>;
}
