use std::io::Write as _;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{COOKIE, LOCATION};
use reqwest::StatusCode;
use retry::{delay, retry, OperationResult};

use crate::config::{Config, SessionConfig};
use crate::model::Credential;
use crate::progress::Report;
use crate::service::error::ServiceError;
use crate::service::request::{Execute, Page, RawResponse, BASE_URL};
use crate::{Error, Result};

/// Cookie the judge checks to restore a login without a password.
pub static AUTOLOGIN_COOKIE: &str = "bojautologin";

/// Cookie set held for one invocation : the cookies the judge handed out on
/// the main page, with the stored auto-login token on top. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    cookies: Vec<(String, String)>,
}

impl Session {
    pub fn build(credential: &Credential, main_page: &RawResponse) -> Result<Self> {
        if credential.token().is_empty() {
            return Err(Error::new(ServiceError::Auth {
                reason: "found empty auto-login token",
            }));
        }
        let mut cookies = main_page.cookies().to_vec();
        match cookies
            .iter_mut()
            .find(|pair| pair.0.as_str() == AUTOLOGIN_COOKIE)
        {
            Some(pair) => pair.1 = credential.token().to_owned(),
            None => cookies.push((AUTOLOGIN_COOKIE.to_owned(), credential.token().to_owned())),
        }
        Ok(Self { cookies })
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct RetryRequestBuilder<'a> {
    inner: RequestBuilder,
    is_accept: Box<dyn Fn(StatusCode) -> bool + 'a>,
    is_reject: Box<dyn Fn(StatusCode) -> bool + 'a>,
    client: &'a Client,
    retry_limit: usize,
    retry_interval: Duration,
    rep: &'a mut dyn Report,
}

impl<'a> RetryRequestBuilder<'a> {
    pub fn accept(mut self, accept: impl Fn(StatusCode) -> bool + 'a) -> Self {
        self.is_accept = Box::new(accept);
        self
    }

    pub fn reject(mut self, reject: impl Fn(StatusCode) -> bool + 'a) -> Self {
        self.is_reject = Box::new(reject);
        self
    }

    fn send_pretty(&mut self) -> Result<Response> {
        let req = self
            .inner
            .try_clone()
            .ok_or_else(|| Error::msg("Could not build request"))?
            .build()?;
        write!(self.rep, "{:7} {} ... ", req.method().as_str(), req.url()).unwrap_or(());
        let result = self.client.execute(req).context("Could not send request");
        match &result {
            Ok(res) => writeln!(self.rep, "{}", res.status()),
            Err(_) => writeln!(self.rep, "failed"),
        }
        .unwrap_or(());
        result
    }

    pub fn retry_send(&mut self) -> Result<Option<Response>> {
        let durations =
            delay::Fixed::from_millis(self.retry_interval.as_millis() as u64).take(self.retry_limit);
        retry(durations, || match self.send_pretty() {
            Ok(res) => {
                if self.is_accept.as_ref()(res.status()) {
                    OperationResult::Ok(Some(res))
                } else if self.is_reject.as_ref()(res.status()) {
                    OperationResult::Ok(None)
                } else {
                    OperationResult::Retry(Error::msg("Received request needs retry"))
                }
            }
            Err(err) => OperationResult::Retry(err),
        })
        .map_err(|err| match err {
            retry::Error::Operation { error, .. } => error,
            retry::Error::Internal(msg) => Error::msg(msg),
        })
    }
}

pub trait WithRetry {
    fn with_retry<'a>(
        self,
        client: &'a Client,
        session: &SessionConfig,
        rep: &'a mut dyn Report,
    ) -> RetryRequestBuilder<'a>;
}

impl WithRetry for RequestBuilder {
    fn with_retry<'a>(
        self,
        client: &'a Client,
        session: &SessionConfig,
        rep: &'a mut dyn Report,
    ) -> RetryRequestBuilder<'a> {
        RetryRequestBuilder {
            inner: self,
            is_accept: Box::new(|status: StatusCode| status.is_success()),
            is_reject: Box::new(|status: StatusCode| {
                status.is_redirection() || status.is_client_error()
            }),
            client,
            retry_limit: session.retry_limit(),
            retry_interval: session.retry_interval(),
            rep,
        }
    }
}

/// Production executor : shapes a `reqwest` call from a `Page`, attaches
/// session cookies where required, retries server errors, and follows the
/// submit-post redirect once to reach the status page.
pub struct HttpExec<'a> {
    client: &'a Client,
    conf: &'a Config,
}

impl<'a> HttpExec<'a> {
    pub fn new(client: &'a Client, conf: &'a Config) -> Self {
        Self { client, conf }
    }

    fn rejected(&self, page: &Page) -> Error {
        if page.needs_session() {
            Error::new(ServiceError::Auth {
                reason: "request was redirected or refused, check the stored credential",
            })
        } else {
            Error::msg("Received invalid response")
        }
    }

    fn follow_redirect(
        &self,
        res: &Response,
        session: Option<&Session>,
        rep: &mut dyn Report,
    ) -> Result<RawResponse> {
        let location = res
            .headers()
            .get(LOCATION)
            .and_then(|val| val.to_str().ok())
            .ok_or_else(|| Error::msg("Received redirect without location"))?;
        let url = BASE_URL
            .join(location)
            .context("Could not parse redirect location")?;
        let mut builder = self.client.get(url);
        if let Some(session) = session {
            builder = builder.header(COOKIE, session.cookie_header());
        }
        let res = builder
            .with_retry(self.client, self.conf.session(), rep)
            .retry_send()?
            .ok_or_else(|| Error::msg("Received invalid response"))?;
        RawResponse::read(res)
    }
}

impl Execute for HttpExec<'_> {
    fn execute(
        &mut self,
        page: &Page,
        session: Option<&Session>,
        rep: &mut dyn Report,
    ) -> Result<RawResponse> {
        let url = page.url(self.conf)?;
        let mut builder = self.client.request(page.method(), url);
        if let Some(params) = page.form_params() {
            builder = builder.form(&params);
        }
        if page.needs_session() {
            let session = session.ok_or_else(|| {
                Error::msg("No session established for an authenticated request")
            })?;
            builder = builder.header(COOKIE, session.cookie_header());
        }
        let res = builder
            .with_retry(self.client, self.conf.session(), rep)
            .accept(|status| page.accepts(status))
            .reject(|status| page.rejects(status))
            .retry_send()?
            .ok_or_else(|| self.rejected(page))?;
        if res.status().is_redirection() {
            return self.follow_redirect(&res, session, rep);
        }
        RawResponse::read(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_page(cookies: &[(&str, &str)]) -> RawResponse {
        let cookies = cookies
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        RawResponse::new(StatusCode::OK, cookies, "<html></html>")
    }

    #[test]
    fn test_build_is_superset_of_main_page_cookies() -> anyhow::Result<()> {
        let credential = Credential::new("user", "token123");
        let main_page = main_page(&[("OnlineJudge", "sess"), ("theme", "dark")]);

        let session = Session::build(&credential, &main_page)?;
        for (name, value) in main_page.cookies() {
            if name.as_str() == AUTOLOGIN_COOKIE {
                continue;
            }
            assert!(session
                .cookies()
                .iter()
                .any(|pair| &pair.0 == name && &pair.1 == value));
        }
        assert!(session
            .cookies()
            .iter()
            .any(|pair| pair.0.as_str() == AUTOLOGIN_COOKIE && pair.1 == "token123"));
        Ok(())
    }

    #[test]
    fn test_build_overrides_judge_autologin_cookie() -> anyhow::Result<()> {
        let credential = Credential::new("user", "stored");
        let main_page = main_page(&[(AUTOLOGIN_COOKIE, "from-judge"), ("OnlineJudge", "sess")]);

        let session = Session::build(&credential, &main_page)?;
        let autologin: Vec<_> = session
            .cookies()
            .iter()
            .filter(|pair| pair.0.as_str() == AUTOLOGIN_COOKIE)
            .collect();
        assert_eq!(autologin.len(), 1);
        assert_eq!(autologin[0].1, "stored");
        Ok(())
    }

    #[test]
    fn test_build_fails_on_empty_token() {
        let credential = Credential::new("user", "");
        let err = Session::build(&credential, &main_page(&[])).unwrap_err();
        match err.downcast_ref::<ServiceError>() {
            Some(ServiceError::Auth { .. }) => {}
            other => panic!("unexpected error kind : {:?}", other),
        }
    }

    #[test]
    fn test_cookie_header() -> anyhow::Result<()> {
        let credential = Credential::new("user", "tok");
        let session = Session::build(&credential, &main_page(&[("OnlineJudge", "sess")]))?;
        assert_eq!(
            session.cookie_header(),
            format!("OnlineJudge=sess; {}=tok", AUTOLOGIN_COOKIE)
        );
        Ok(())
    }
}
