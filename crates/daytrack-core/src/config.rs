use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::parse_timezone;
use crate::task::{
  DEFAULT_ESTIMATE_MINUTES,
  Priority
};

pub const DB_FILE_NAME: &str =
  "tasks.db";
const RC_ENV: &str = "DAYTRACK_RC";
const TIMEZONE_ENV: &str =
  "DAYTRACK_TIMEZONE";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "timezone".to_string(),
      "UTC".to_string()
    );
    map.insert(
      "default.estimate".to_string(),
      DEFAULT_ESTIMATE_MINUTES
        .to_string()
    );
    map.insert(
      "default.priority".to_string(),
      "medium".to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    if let Ok(tz) =
      std::env::var(TIMEZONE_ENV)
    {
      debug!(timezone = %tz, "timezone from environment");
      cfg.map.insert(
        "timezone".to_string(),
        tz
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn color_enabled(&self) -> bool {
    self
      .get_bool("color")
      .unwrap_or(true)
  }

  /// Zone used for day windows. An unknown id falls back to UTC.
  pub fn timezone(&self) -> Tz {
    self
      .map
      .get("timezone")
      .and_then(|raw| {
        parse_timezone(raw, "config")
      })
      .unwrap_or(chrono_tz::UTC)
  }

  pub fn default_estimate(
    &self
  ) -> anyhow::Result<u32> {
    let Some(raw) =
      self.map.get("default.estimate")
    else {
      return Ok(
        DEFAULT_ESTIMATE_MINUTES
      );
    };
    let minutes: u32 = raw
      .trim()
      .parse()
      .with_context(|| {
        format!(
          "invalid default.estimate: \
           {raw}"
        )
      })?;
    if minutes == 0 {
      return Err(anyhow!(
        "default.estimate must be \
         greater than zero"
      ));
    }
    Ok(minutes)
  }

  pub fn default_priority(
    &self
  ) -> anyhow::Result<Priority> {
    match self
      .map
      .get("default.priority")
    {
      | Some(raw) => {
        raw.parse::<Priority>().with_context(
          || {
            format!(
              "invalid \
               default.priority: \
               {raw}"
            )
          }
        )
      }
      | None => Ok(Priority::default())
    }
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if self.loaded_files.contains(&path)
    {
      warn!(file = %path.display(), "rc file already loaded; skipping include cycle");
      return Ok(());
    }
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    return Ok(None);
  };
  let candidate =
    home.join(".daytrackrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .or_else(dirs::home_dir)
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join("daytrack"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn rc_file_with_include_and_comments()
  {
    let dir =
      tempdir().expect("tempdir");
    let extra = dir.path().join("extra");
    fs::write(
      &extra,
      "default.priority = high\n"
    )
    .expect("write include");
    let rc = dir.path().join("rc");
    fs::write(
      &rc,
      "# personal settings\n\
       default.estimate = 45 # minutes\n\
       color = off\n\
       include extra\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(rc.as_path()))
      .expect("load");
    assert_eq!(
      cfg.default_estimate().expect("estimate"),
      45
    );
    assert_eq!(
      cfg
        .default_priority()
        .expect("priority"),
      Priority::High
    );
    assert!(!cfg.color_enabled());
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn overrides_strip_rc_prefix_and_win() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "rc.timezone".to_string(),
        "Europe/Berlin".to_string()
      ),
      (
        "default.estimate".to_string(),
        "10".to_string()
      ),
    ]);
    assert_eq!(
      cfg.timezone(),
      chrono_tz::Europe::Berlin
    );
    assert_eq!(
      cfg.default_estimate().expect("estimate"),
      10
    );
  }

  #[test]
  fn bad_values_are_reported() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "default.estimate".to_string(),
        "0".to_string()
      ),
      (
        "default.priority".to_string(),
        "urgent".to_string()
      ),
      (
        "timezone".to_string(),
        "Mars/Olympus".to_string()
      ),
    ]);
    assert!(cfg.default_estimate().is_err());
    assert!(cfg.default_priority().is_err());
    assert_eq!(
      cfg.timezone(),
      chrono_tz::UTC
    );
  }

  #[test]
  fn malformed_line_names_file_and_line()
  {
    let dir =
      tempdir().expect("tempdir");
    let rc = dir.path().join("rc");
    fs::write(&rc, "color = on\nnonsense\n")
      .expect("write rc");
    let err = Config::load(Some(rc.as_path()))
      .expect_err("should fail");
    assert!(
      format!("{err:#}").contains(":2:")
    );
  }

  #[test]
  fn data_dir_override_is_created() {
    let dir =
      tempdir().expect("tempdir");
    let target =
      dir.path().join("nested/data");
    let resolved = resolve_data_dir(
      &Config::default(),
      Some(target.as_path())
    )
    .expect("resolve");
    assert_eq!(resolved, target);
    assert!(target.is_dir());
  }
}
