use std::io::Read as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use getset::{CopyGetters, Getters};
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::redirect::Policy;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::abs_path::AbsPathBuf;
use crate::model::{CodeOpen, Credential, ProblemId, ProblemInfo, SourceFile};
use crate::{Console, Result, VERSION};

static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize, Getters, Debug, Clone, PartialEq, Eq)]
#[get = "pub"]
pub struct Config {
    base_dir: AbsPathBuf,
    body: ConfigBody,
}

impl Config {
    pub fn search(cnsl: &mut Console) -> Result<Self> {
        let cwd = AbsPathBuf::cwd()?;
        let base_dir = cwd.search_dir_contains(ConfigBody::FILE_NAME).with_context(|| {
            format!(
                "Could not find config file ({}) in {} or any of the parent directories. \
                 Create the config file first.",
                ConfigBody::FILE_NAME,
                cwd
            )
        })?;
        let body = ConfigBody::load(&base_dir, cnsl)?;
        Ok(Self { base_dir, body })
    }

    pub fn session(&self) -> &SessionConfig {
        &self.body.session
    }

    pub fn solver(&self) -> &SolverConfig {
        &self.body.solver
    }

    pub fn watch(&self) -> &WatchConfig {
        &self.body.watch
    }

    pub fn submit(&self) -> &SubmitConfig {
        &self.body.submit
    }

    pub fn build_client(&self) -> Result<Client> {
        self.body
            .session
            .client_builder()
            .build()
            .context("Could not setup http client")
    }

    /// Locates and loads the problem metadata file. With an explicit problem
    /// id the file is expected under `<base>/<id>/`; otherwise the current
    /// directory and its parents are searched.
    pub fn load_problem_info(
        &self,
        problem_id: &Option<ProblemId>,
        cnsl: &mut Console,
    ) -> Result<(ProblemInfo, AbsPathBuf)> {
        let dir = match problem_id {
            Some(id) => self.base_dir.join(id.as_ref()),
            None => AbsPathBuf::cwd()?
                .search_dir_contains(ProblemInfo::FILE_NAME)
                .with_context(|| {
                    format!(
                        "Could not find problem info ({}) in the current directory \
                         or any of the parent directories",
                        ProblemInfo::FILE_NAME
                    )
                })?,
        };
        let path = dir.join(ProblemInfo::FILE_NAME);
        let info: ProblemInfo = path.load_pretty(
            |file| serde_json::from_reader(file).context("Could not read problem info as json"),
            Some(&self.base_dir),
            cnsl,
        )?;
        if let Some(id) = problem_id {
            if info.id() != id {
                return Err(anyhow!(
                    "Found mismatching problem id in problem info : {}",
                    info.id()
                ));
            }
        }
        Ok((info, path))
    }

    pub fn save_problem_info(
        &self,
        info: &ProblemInfo,
        path: &AbsPathBuf,
        cnsl: &mut Console,
    ) -> Result<()> {
        path.save_pretty(
            |file| serde_json::to_writer_pretty(file, info).context("Could not save problem info"),
            Some(&self.base_dir),
            cnsl,
        )
    }

    pub fn load_source(
        &self,
        info: &ProblemInfo,
        info_path: &AbsPathBuf,
        cnsl: &mut Console,
    ) -> Result<SourceFile> {
        let dir = info_path
            .parent()
            .with_context(|| format!("Could not get problem dir of : {}", info_path))?;
        let path = dir.join(info.source_path());
        let text = path.load_pretty(
            |mut file| {
                let mut buf = String::new();
                file.read_to_string(&mut buf)
                    .context("Could not read source file")?;
                Ok(buf)
            },
            Some(&self.base_dir),
            cnsl,
        )?;
        Ok(SourceFile::new(info.source_path().clone(), text))
    }

    pub fn load_credential(&self, cnsl: &mut Console) -> Result<Credential> {
        let path = self.credential_abs_path()?;
        path.load_pretty(
            |file| serde_json::from_reader(file).context("Could not read credential as json"),
            None,
            cnsl,
        )
    }

    fn credential_abs_path(&self) -> Result<AbsPathBuf> {
        let path = &self.body.credential_path;
        if path.is_absolute() {
            AbsPathBuf::try_new(path)
        } else {
            Ok(self.base_dir.join(path))
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn default_in_dir(base_dir: AbsPathBuf) -> Self {
        Self {
            base_dir,
            body: ConfigBody::default(),
        }
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self::default_in_dir(
            AbsPathBuf::try_new(std::env::temp_dir().join(env!("CARGO_PKG_NAME"))).unwrap(),
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigBody {
    #[serde(with = "version_string")]
    version: Version,
    session: SessionConfig,
    solver: SolverConfig,
    watch: WatchConfig,
    submit: SubmitConfig,
    credential_path: PathBuf,
}

impl ConfigBody {
    pub const FILE_NAME: &'static str = "bojsub.yaml";

    fn load(base_dir: &AbsPathBuf, cnsl: &mut Console) -> Result<Self> {
        let body: Self = base_dir.join(Self::FILE_NAME).load_pretty(
            |file| serde_yaml::from_reader(file).context("Could not read config file as yaml"),
            None,
            cnsl,
        )?;
        body.validate()?;
        Ok(body)
    }

    fn validate(&self) -> Result<()> {
        let version_req =
            VersionReq::parse(&self.version.to_string()).context("Could not parse version")?;
        if !version_req.matches(&VERSION) {
            return Err(anyhow!(
                r#"Found mismatched version in config file.
    config version : {}
    {} version : {}
Fix the config file so that it is compatible with the current version."#,
                self.version,
                env!("CARGO_PKG_NAME"),
                &*VERSION
            ));
        }
        Ok(())
    }

    fn default_credential_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .expect("Could not get home dir")
                    .join(".local")
                    .join("share")
            })
            .join(env!("CARGO_PKG_NAME"))
            .join("credential.json")
    }
}

impl Default for ConfigBody {
    fn default() -> Self {
        Self {
            version: VERSION.clone(),
            session: SessionConfig::default(),
            solver: SolverConfig::default(),
            watch: WatchConfig::default(),
            submit: SubmitConfig::default(),
            credential_path: Self::default_credential_path(),
        }
    }
}

mod version_string {
    use std::str::FromStr as _;

    use semver::Version;
    use serde::{de, Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        version: &Version,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Version, D::Error> {
        Version::from_str(&String::deserialize(deserializer)?).map_err(de::Error::custom)
    }
}

#[derive(
    Serialize, Deserialize, Getters, CopyGetters, Debug, Clone, PartialEq, Eq, Hash,
)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(with = "humantime_serde")]
    #[get_copy = "pub"]
    timeout: Duration,
    #[get_copy = "pub"]
    retry_limit: usize,
    #[serde(with = "humantime_serde")]
    #[get_copy = "pub"]
    retry_interval: Duration,
}

impl SessionConfig {
    fn client_builder(&self) -> ClientBuilder {
        Client::builder()
            .referer(false)
            .redirect(Policy::none()) // redirects manually
            .user_agent(USER_AGENT)
            .timeout(Some(self.timeout))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_limit: 4,
            retry_interval: Duration::from_secs(2),
        }
    }
}

#[derive(
    Serialize, Deserialize, Getters, CopyGetters, Debug, Clone, PartialEq, Eq, Hash,
)]
#[serde(default)]
pub struct SolverConfig {
    /// Base url of the Turnstile solver service.
    #[get = "pub"]
    base_url: String,
    #[serde(with = "humantime_serde")]
    #[get_copy = "pub"]
    poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    #[get_copy = "pub"]
    poll_timeout: Duration,
}

#[cfg(test)]
impl SolverConfig {
    pub fn for_tests(poll_interval: Duration, poll_timeout: Duration) -> Self {
        Self {
            poll_interval,
            poll_timeout,
            ..Self::default()
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_owned(),
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(
    Serialize, Deserialize, Getters, CopyGetters, Debug, Clone, PartialEq, Eq, Hash,
)]
#[serde(default)]
pub struct WatchConfig {
    #[serde(with = "humantime_serde")]
    #[get_copy = "pub"]
    timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(
    Serialize, Deserialize, Getters, CopyGetters, Debug, Clone, PartialEq, Eq, Hash,
)]
#[serde(default)]
pub struct SubmitConfig {
    #[get_copy = "pub"]
    code_open: CodeOpen,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            code_open: CodeOpen::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_serialize_default() -> anyhow::Result<()> {
        serde_yaml::to_string(&ConfigBody::default())?;
        Ok(())
    }

    #[test]
    fn test_deserialize_partial_config() -> anyhow::Result<()> {
        let body: ConfigBody = serde_yaml::from_str(&format!(
            "version: {}\nsolver:\n  base_url: http://solver.local:8080\n",
            &*VERSION
        ))?;
        assert_eq!(body.solver.base_url(), "http://solver.local:8080");
        assert_eq!(body.session.retry_limit(), 4);
        body.validate()?;
        Ok(())
    }

    #[test]
    fn test_validate_rejects_mismatched_version() {
        let mut body = ConfigBody::default();
        body.version = Version::parse("99.0.0").unwrap();
        assert!(body.validate().is_err());
    }

    #[test]
    fn test_problem_info_roundtrip() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let base = AbsPathBuf::try_new(tmp.path())?;
        let conf = Config::default_in_dir(base.clone());
        let mut cnsl = Console::sink();

        let problem_dir = tmp.path().join("1000");
        fs::create_dir_all(&problem_dir)?;
        let mut info = ProblemInfo::new("1000", "A+B", 95, "main.cpp");
        fs::write(
            problem_dir.join(ProblemInfo::FILE_NAME),
            serde_json::to_string(&info)?,
        )?;

        let problem_id = Some(ProblemId::from("1000"));
        let (loaded, path) = conf.load_problem_info(&problem_id, &mut cnsl)?;
        assert_eq!(loaded, info);

        info.set_accepted(true);
        info.set_checksum(Some("abc123".to_owned()));
        conf.save_problem_info(&info, &path, &mut cnsl)?;
        let (reloaded, _) = conf.load_problem_info(&problem_id, &mut cnsl)?;
        assert!(reloaded.accepted());
        assert_eq!(reloaded.checksum(), &Some("abc123".to_owned()));
        Ok(())
    }

    #[test]
    fn test_load_problem_info_rejects_mismatching_id() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let conf = Config::default_in_dir(AbsPathBuf::try_new(tmp.path())?);
        let mut cnsl = Console::sink();

        let problem_dir = tmp.path().join("2000");
        fs::create_dir_all(&problem_dir)?;
        let info = ProblemInfo::new("1000", "A+B", 95, "main.cpp");
        fs::write(
            problem_dir.join(ProblemInfo::FILE_NAME),
            serde_json::to_string(&info)?,
        )?;

        let result = conf.load_problem_info(&Some(ProblemId::from("2000")), &mut cnsl);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_load_source() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let base = AbsPathBuf::try_new(tmp.path())?;
        let conf = Config::default_in_dir(base.clone());
        let mut cnsl = Console::sink();

        fs::write(tmp.path().join("main.cpp"), "int main() {}\n")?;
        let info = ProblemInfo::new("1000", "A+B", 95, "main.cpp");
        let info_path = base.join(ProblemInfo::FILE_NAME);

        let source = conf.load_source(&info, &info_path, &mut cnsl)?;
        assert_eq!(source.text(), "int main() {}\n");
        assert!(!source.is_empty());
        Ok(())
    }
}
