use std::time::Duration;

use anyhow::Context as _;

use crate::config::SolverConfig;
use crate::model::{Credential, ProblemId, SolutionId, VerdictMessage};
use crate::progress::{ProgressEvent, Report};
use crate::service::request::{submit_url, Execute, Page, SubmitForm};
use crate::service::scrape::{CsrfKey, Extract as _, TurnstileSitekey};
use crate::service::session::Session;
use crate::service::solver::{self, CaptchaToken};
use crate::service::watch::{self, Subscribe};
use crate::Result;

/// Network half of the submit workflow. One method per step; the submit
/// command sequences them and owns persistence.
#[derive(Debug)]
pub struct BojActor<E, S> {
    exec: E,
    sub: S,
}

impl<E: Execute, S: Subscribe> BojActor<E, S> {
    pub fn new(exec: E, sub: S) -> Self {
        Self { exec, sub }
    }

    /// Fetches the judge's main page for fresh cookies and merges in the
    /// stored auto-login token.
    pub fn authenticate(
        &mut self,
        credential: &Credential,
        rep: &mut dyn Report,
    ) -> Result<Session> {
        rep.event(ProgressEvent::Authenticating)?;
        let main_page = self.exec.execute(&Page::Main, None, rep)?;
        Session::build(credential, &main_page)
    }

    /// Fetches the submit page and pulls out the csrf key and the challenge
    /// site key embedded in it.
    pub fn fetch_submit_page(
        &mut self,
        session: &Session,
        problem_id: &ProblemId,
        rep: &mut dyn Report,
    ) -> Result<(CsrfKey, TurnstileSitekey)> {
        rep.event(ProgressEvent::FetchingSubmitPage)?;
        let page = Page::Submit {
            problem_id: problem_id.clone(),
        };
        let res = self.exec.execute(&page, Some(session), rep)?;
        let html = res.html();
        let csrf_key = CsrfKey::extract(&html)?;
        let sitekey = TurnstileSitekey::extract(&html)?;
        Ok((csrf_key, sitekey))
    }

    pub fn solve_captcha(
        &mut self,
        conf: &SolverConfig,
        problem_id: &ProblemId,
        sitekey: &TurnstileSitekey,
        rep: &mut dyn Report,
    ) -> Result<CaptchaToken> {
        rep.event(ProgressEvent::SolvingCaptcha)?;
        let page_url = submit_url(problem_id)?;
        solver::solve(&mut self.exec, conf, &page_url, sitekey, rep)
    }

    /// Posts the submission and reads the new solution id off the status page.
    pub fn post_submission(
        &mut self,
        session: &Session,
        form: SubmitForm,
        rep: &mut dyn Report,
    ) -> Result<SolutionId> {
        rep.event(ProgressEvent::Submitting)?;
        let res = self
            .exec
            .execute(&Page::SubmitPost { form }, Some(session), rep)?;
        SolutionId::extract(&res.html()).context("Could not locate the new submission")
    }

    pub fn watch_verdict(
        &mut self,
        solution_id: &SolutionId,
        timeout: Duration,
        rep: &mut dyn Report,
    ) -> Result<VerdictMessage> {
        rep.event(ProgressEvent::AwaitingVerdict(solution_id.clone()))?;
        let mut chan = self.sub.subscribe(solution_id)?;
        watch::await_verdict(&mut chan, timeout, rep)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use reqwest::StatusCode;

    use super::*;
    use crate::config::Config;
    use crate::model::{CodeOpen, ProblemInfo, SourceFile, Verdict};
    use crate::progress::NullReport;
    use crate::service::request::RawResponse;
    use crate::service::watch::ReceiveMessage;

    static MAIN_PAGE: &str = "<html><body>Baekjoon Online Judge</body></html>";

    static SUBMIT_PAGE: &str = r#"<html><body>
<form id="submit_form" method="post" action="/submit/1000">
  <input type="hidden" name="csrf_key" value="1a2b3c4d5e6f">
  <div class="cf-turnstile" data-sitekey="0xKEY"></div>
</form>
</body></html>"#;

    static STATUS_PAGE: &str = r#"<html><body>
<table id="status-table"><tbody>
  <tr id="solution-71234567"><td>Pending</td></tr>
</tbody></table>
</body></html>"#;

    struct FakeExec {
        replies: VecDeque<RawResponse>,
        log: Vec<&'static str>,
    }

    impl Execute for FakeExec {
        fn execute(
            &mut self,
            page: &Page,
            session: Option<&Session>,
            _rep: &mut dyn Report,
        ) -> Result<RawResponse> {
            if page.needs_session() {
                assert!(session.is_some(), "authenticated page without session");
            }
            self.log.push(page.label());
            Ok(self.replies.pop_front().expect("unexpected request"))
        }
    }

    struct FakeChannel(VecDeque<VerdictMessage>);

    impl ReceiveMessage for FakeChannel {
        fn recv(&mut self, _wait: std::time::Duration) -> Result<Option<VerdictMessage>> {
            Ok(self.0.pop_front())
        }
    }

    struct FakeSubscriber(Vec<VerdictMessage>);

    impl Subscribe for FakeSubscriber {
        type Channel = FakeChannel;

        fn subscribe(&self, solution_id: &SolutionId) -> Result<FakeChannel> {
            assert_eq!(solution_id.as_ref(), "71234567");
            Ok(FakeChannel(self.0.clone().into()))
        }
    }

    fn canned_replies() -> VecDeque<RawResponse> {
        let ok = |body: &str| RawResponse::new(StatusCode::OK, vec![], body);
        vec![
            RawResponse::new(
                StatusCode::OK,
                vec![("OnlineJudge".to_owned(), "sess".to_owned())],
                MAIN_PAGE,
            ),
            ok(SUBMIT_PAGE),
            ok(r#"{"task_id":"42"}"#),
            ok("CAPTCHA_NOT_READY"),
            ok(r#"{"value":"tok123"}"#),
            ok(STATUS_PAGE),
        ]
        .into()
    }

    fn progress(labels: &[&str]) -> Vec<VerdictMessage> {
        labels
            .iter()
            .map(|label| VerdictMessage::new(Verdict::from((*label).to_string())))
            .collect()
    }

    #[test]
    fn test_submit_workflow_end_to_end() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let conf = Config::default_in_dir(crate::abs_path::AbsPathBuf::try_new(tmp.path())?);
        let rep = &mut NullReport::new();

        let mut actor = BojActor::new(
            FakeExec {
                replies: canned_replies(),
                log: Vec::new(),
            },
            FakeSubscriber(progress(&["Judging 10%", "Judging 90%", "Accepted"])),
        );

        let mut info = ProblemInfo::new("1000", "A+B", 95, "main.cpp");
        let source = SourceFile::new("main.cpp", "int main() {}\n");
        let credential = Credential::new("user", "token");

        // the documented workflow order
        let session = actor.authenticate(&credential, rep)?;
        let (csrf_key, sitekey) = actor.fetch_submit_page(&session, info.id(), rep)?;
        let token = actor.solve_captcha(conf.solver(), info.id(), &sitekey, rep)?;
        let form = SubmitForm::new(
            info.id().clone(),
            info.language_id(),
            CodeOpen::Open,
            &source,
            csrf_key,
            token,
        );
        let solution_id = actor.post_submission(&session, form, rep)?;
        let verdict = actor.watch_verdict(&solution_id, std::time::Duration::from_secs(5), rep)?;

        assert_eq!(solution_id.as_ref(), "71234567");
        assert_eq!(verdict.status(), &Verdict::Accepted);
        assert_eq!(
            actor.exec.log,
            vec![
                "main-page",
                "submit-page",
                "solver-create",
                "solver-poll",
                "solver-poll",
                "submit-post",
            ]
        );

        // outcome is persisted with the checksum of the submitted source
        info.set_accepted(verdict.status().is_accepted());
        info.set_checksum(Some(source.checksum()));
        let info_path = conf.base_dir().join(ProblemInfo::FILE_NAME);
        conf.save_problem_info(&info, &info_path, &mut crate::Console::buf())?;

        let saved: ProblemInfo = info_path
            .load(|file| Ok(serde_json::from_reader(file)?))?;
        assert!(saved.accepted());
        assert_eq!(saved.checksum(), &Some(source.checksum()));
        Ok(())
    }

    #[test]
    fn test_checksum_is_idempotent_across_runs() {
        let source = SourceFile::new("main.cpp", "int main() {}\n");
        let first = source.checksum();
        let again = SourceFile::new("main.cpp", "int main() {}\n").checksum();
        assert_eq!(first, again);
    }

    #[test]
    fn test_watch_verdict_reports_timeout() {
        let mut actor = BojActor::new(
            FakeExec {
                replies: VecDeque::new(),
                log: Vec::new(),
            },
            FakeSubscriber(progress(&["Judging 10%"])),
        );
        let err = actor
            .watch_verdict(
                &SolutionId::new("71234567"),
                std::time::Duration::from_millis(20),
                &mut NullReport::new(),
            )
            .unwrap_err();
        let err = err
            .downcast_ref::<crate::service::error::ServiceError>()
            .expect("expected a service error");
        assert!(err.is_timeout());
    }
}
