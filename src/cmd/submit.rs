use std::fmt;
use std::time::Duration;

use anyhow::Context as _;
use structopt::StructOpt;
use strum::VariantNames as _;

use crate::cmd::{Outcome, Run};
use crate::config::Config;
use crate::model::{CodeOpen, ProblemId, SolutionId, VerdictMessage};
use crate::service::{BojActor, HttpExec, PusherSubscriber, ServiceError, SubmitForm};
use crate::{Console, Error, Result};

#[derive(StructOpt, Debug, Clone, PartialEq, Eq, Hash)]
#[structopt(rename_all = "kebab")]
pub struct SubmitOpt {
    /// Problem id; when omitted, problem info is searched upward from the
    /// current directory
    #[structopt(name = "problem")]
    problem_id: Option<ProblemId>,
    /// Source visibility on the judge
    #[structopt(long, possible_values = &CodeOpen::VARIANTS)]
    code_open: Option<CodeOpen>,
    /// How long to wait for the verdict (e.g. 90s, 2m)
    #[structopt(long, parse(try_from_str = humantime::parse_duration))]
    timeout: Option<Duration>,
}

impl Run for SubmitOpt {
    fn run(&self, conf: &Config, cnsl: &mut Console) -> Result<Box<dyn Outcome>> {
        // locate problem and login material
        let (mut info, info_path) = conf
            .load_problem_info(&self.problem_id, cnsl)
            .context("Could not load problem info")?;
        let credential = conf
            .load_credential(cnsl)
            .context("Could not load credential")?;

        let client = conf.build_client()?;
        let mut actor = BojActor::new(HttpExec::new(&client, conf), PusherSubscriber::default());

        let session = actor.authenticate(&credential, cnsl)?;
        let (csrf_key, sitekey) = actor.fetch_submit_page(&session, info.id(), cnsl)?;

        let source = conf
            .load_source(&info, &info_path, cnsl)
            .context("Could not load source file")?;
        if source.is_empty() {
            return Err(Error::msg("Found empty source file"));
        }

        let captcha_token = actor.solve_captcha(conf.solver(), info.id(), &sitekey, cnsl)?;
        let code_open = self.code_open.unwrap_or_else(|| conf.submit().code_open());
        let form = SubmitForm::new(
            info.id().clone(),
            info.language_id(),
            code_open,
            &source,
            csrf_key,
            captcha_token,
        );
        let solution_id = actor.post_submission(&session, form, cnsl)?;

        let timeout = self.timeout.unwrap_or_else(|| conf.watch().timeout());
        let (verdict, timed_out) = match actor.watch_verdict(&solution_id, timeout, cnsl) {
            Ok(message) => (Some(message), false),
            Err(err) => {
                let is_timeout = err
                    .downcast_ref::<ServiceError>()
                    .map_or(false, ServiceError::is_timeout);
                if !is_timeout {
                    return Err(err);
                }
                cnsl.warn("Verdict was not reached in time; recording the submission anyway")?;
                (None, true)
            }
        };

        // bookkeeping happens on a terminal verdict and on verdict timeout,
        // never on upstream failures
        info.set_accepted(verdict.as_ref().map_or(false, |m| m.status().is_accepted()));
        info.set_checksum(Some(source.checksum()));
        conf.save_problem_info(&info, &info_path, cnsl)?;

        Ok(Box::new(SubmitOutcome {
            problem_id: info.id().clone(),
            title: info.title().clone(),
            solution_id,
            verdict,
            timed_out,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    problem_id: ProblemId,
    title: String,
    solution_id: SolutionId,
    verdict: Option<VerdictMessage>,
    timed_out: bool,
}

impl fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {} : ", self.problem_id, self.title)?;
        match &self.verdict {
            Some(message) => write!(f, "{}", message),
            None => write!(
                f,
                "verdict not reached in time (solution {})",
                self.solution_id
            ),
        }
    }
}

impl Outcome for SubmitOutcome {
    fn is_error(&self) -> bool {
        self.timed_out
            || self
                .verdict
                .as_ref()
                .map_or(true, |message| !message.status().is_accepted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Verdict;

    #[test]
    fn test_opt_parse() -> anyhow::Result<()> {
        let opt = SubmitOpt::from_iter_safe(&["submit", "1000", "--code-open", "close"])?;
        assert_eq!(
            opt,
            SubmitOpt {
                problem_id: Some("1000".into()),
                code_open: Some(CodeOpen::Close),
                timeout: None,
            }
        );

        let opt = SubmitOpt::from_iter_safe(&["submit", "--timeout", "90s"])?;
        assert_eq!(opt.timeout, Some(Duration::from_secs(90)));
        assert_eq!(opt.problem_id, None);

        assert!(SubmitOpt::from_iter_safe(&["submit", "--code-open", "hidden"]).is_err());
        Ok(())
    }

    #[test]
    fn test_outcome_display_and_error_flag() {
        let accepted = SubmitOutcome {
            problem_id: "1000".into(),
            title: "A+B".to_owned(),
            solution_id: SolutionId::new("71234567"),
            verdict: Some(VerdictMessage::new(Verdict::Accepted)),
            timed_out: false,
        };
        assert_eq!(accepted.to_string(), "[1000] A+B : Accepted");
        assert!(!accepted.is_error());

        let timed_out = SubmitOutcome {
            verdict: None,
            timed_out: true,
            ..accepted.clone()
        };
        assert!(timed_out.is_error());
        assert!(timed_out.to_string().contains("71234567"));

        let rejected = SubmitOutcome {
            verdict: Some(VerdictMessage::new(Verdict::WrongAnswer)),
            ..accepted
        };
        assert!(rejected.is_error());
    }
}
