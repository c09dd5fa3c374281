use std::thread;
use std::time::{Duration, Instant};

use reqwest::Url;
use serde::Deserialize;

use crate::config::SolverConfig;
use crate::progress::Report;
use crate::service::error::ServiceError;
use crate::service::request::{Execute, Page};
use crate::service::scrape::TurnstileSitekey;
use crate::{Error, Result};

/// Sentinel body returned by the solver while the challenge is in flight.
static NOT_READY: &str = "CAPTCHA_NOT_READY";

/// Task handle returned by the solver's create-task call. Only used to
/// correlate poll requests; dropped once the loop ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverTask(String);

impl SolverTask {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn for_tests(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// A solved challenge token, ready to be put into the submit form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaToken(String);

impl CaptchaToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn for_tests(token: &str) -> Self {
        Self(token.to_owned())
    }
}

#[derive(Deserialize, Debug)]
struct CreateReply {
    task_id: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PollReply {
    value: Option<String>,
}

/// Submits the challenge to the solver service and polls until a token is
/// ready. The loop is bounded by `poll_timeout`; the wait between polls never
/// overshoots the deadline.
pub fn solve<E: Execute>(
    exec: &mut E,
    conf: &SolverConfig,
    page_url: &Url,
    sitekey: &TurnstileSitekey,
    rep: &mut dyn Report,
) -> Result<CaptchaToken> {
    solve_with(exec, conf, page_url, sitekey, rep, thread::sleep)
}

fn solve_with<E: Execute>(
    exec: &mut E,
    conf: &SolverConfig,
    page_url: &Url,
    sitekey: &TurnstileSitekey,
    rep: &mut dyn Report,
    mut sleep: impl FnMut(Duration),
) -> Result<CaptchaToken> {
    let create = Page::SolverCreate {
        page_url: page_url.clone(),
        sitekey: sitekey.as_str().to_owned(),
    };
    let reply: CreateReply = exec
        .execute(&create, None, rep)?
        .json()
        .map_err(|err| solver_error(format!("create-task returned malformed payload : {}", err)))?;
    let task = reply
        .task_id
        .filter(|id| !id.is_empty())
        .map(SolverTask)
        .ok_or_else(|| solver_error("create-task did not return a task id".to_owned()))?;

    let deadline = Instant::now() + conf.poll_timeout();
    loop {
        let poll = Page::SolverPoll { task: task.clone() };
        let res = exec.execute(&poll, None, rep)?;
        if res.text().trim() != NOT_READY {
            let reply: PollReply = res.json().map_err(|err| {
                solver_error(format!("poll-result returned malformed payload : {}", err))
            })?;
            if let Some(value) = reply.value.filter(|value| !value.is_empty()) {
                return Ok(CaptchaToken(value));
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::new(ServiceError::Timeout {
                waited: conf.poll_timeout(),
            })
            .context("Captcha was not solved in time"));
        }
        sleep(conf.poll_interval().min(deadline.saturating_duration_since(now)));
    }
}

fn solver_error(reason: String) -> Error {
    Error::new(ServiceError::Solver { reason })
}
