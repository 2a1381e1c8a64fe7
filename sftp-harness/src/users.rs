//! User specs accepted by the image, and `id` output parsing
//!
//! A spec is `name:password[:uid[:gid[:homedir[:dirs]]]]` where `dirs` is a
//! comma-separated list. The image takes specs as positional arguments,
//! as a whitespace-separated list in `SFTP_USERS`, or one per line in a
//! users.conf file.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{HarnessError, HarnessResult};

const MIN_FIELDS: usize = 2;
const MAX_FIELDS: usize = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSpec {
    pub name: String,
    pub password: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub home_dir: Option<String>,
    pub dirs: Vec<String>,
}

fn optional(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}

fn optional_id(field: &str, what: &str, raw: &str) -> HarnessResult<Option<u32>> {
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| {
            HarnessError::Parse(format!("{} '{}' is not numeric in '{}'", what, field, raw))
        })
}

impl UserSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }

    pub fn home_dir(mut self, home_dir: impl Into<String>) -> Self {
        self.home_dir = Some(home_dir.into());
        self
    }

    pub fn dir(mut self, dir: impl Into<String>) -> Self {
        self.dirs.push(dir.into());
        self
    }

    pub fn parse(raw: &str) -> HarnessResult<Self> {
        let fields: Vec<&str> = raw.split(':').collect();
        if !(MIN_FIELDS..=MAX_FIELDS).contains(&fields.len()) {
            return Err(HarnessError::Parse(format!(
                "expected {} to {} ':'-separated fields, got {} in '{}'",
                MIN_FIELDS,
                MAX_FIELDS,
                fields.len(),
                raw
            )));
        }

        let name = fields[0];
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(HarnessError::Parse(format!("invalid user name in '{}'", raw)));
        }

        let field = |i: usize| fields.get(i).copied().unwrap_or_default();
        Ok(Self {
            name: name.to_string(),
            password: optional(field(1)),
            uid: optional_id(field(2), "uid", raw)?,
            gid: optional_id(field(3), "gid", raw)?,
            home_dir: optional(field(4)),
            dirs: field(5)
                .split(',')
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    /// Whitespace-separated specs, as in `SFTP_USERS`.
    pub fn parse_list(raw: &str) -> HarnessResult<Vec<Self>> {
        raw.split_whitespace().map(Self::parse).collect()
    }

    /// One spec per line; blank lines and `#` comments are skipped.
    pub fn parse_config(raw: &str) -> HarnessResult<Vec<Self>> {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(Self::parse)
            .collect()
    }

    pub fn format_list(specs: &[Self]) -> String {
        specs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn format_config(specs: &[Self]) -> String {
        specs.iter().map(|s| format!("{}\n", s)).collect()
    }
}

impl FromStr for UserSpec {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = vec![
            self.name.clone(),
            self.password.clone().unwrap_or_default(),
            self.uid.map(|v| v.to_string()).unwrap_or_default(),
            self.gid.map(|v| v.to_string()).unwrap_or_default(),
            self.home_dir.clone().unwrap_or_default(),
            self.dirs.join(","),
        ];
        while fields.len() > MIN_FIELDS && fields.last().is_some_and(String::is_empty) {
            fields.pop();
        }
        write!(f, "{}", fields.join(":"))
    }
}

static ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^uid=(\d+)\(([^)]*)\) gid=(\d+)\(([^)]*)\)(?: groups=(\S*))?$")
        .unwrap_or_else(|e| panic!("invalid id regex: {e}"))
});

static GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"^(\d+)\(([^)]*)\)$").unwrap_or_else(|e| panic!("invalid group regex: {e}"))
    });

/// Parsed output of `id <user>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub user: String,
    pub gid: u32,
    pub group: String,
    pub groups: Vec<(u32, String)>,
}

impl Identity {
    pub fn parse(raw: &str) -> HarnessResult<Self> {
        let raw = raw.trim();
        let caps = ID_RE
            .captures(raw)
            .ok_or_else(|| HarnessError::Parse(format!("unrecognised id output: '{}'", raw)))?;

        let number = |i: usize| {
            caps[i]
                .parse::<u32>()
                .map_err(|e| HarnessError::Parse(format!("{} in '{}'", e, raw)))
        };

        let mut groups = Vec::new();
        if let Some(list) = caps.get(5) {
            for entry in list.as_str().split(',').filter(|g| !g.is_empty()) {
                let g = GROUP_RE
                    .captures(entry)
                    .ok_or_else(|| {
                        HarnessError::Parse(format!("bad group '{}' in '{}'", entry, raw))
                    })?;
                let gid = g[1]
                    .parse()
                    .map_err(|e| HarnessError::Parse(format!("{} in '{}'", e, raw)))?;
                groups.push((gid, g[2].to_string()));
            }
        }

        Ok(Self {
            uid: number(1)?,
            user: caps[2].to_string(),
            gid: number(3)?,
            group: caps[4].to_string(),
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_spec() {
        let spec = UserSpec::parse("user-from-env:").unwrap();
        assert_eq!(spec, UserSpec::new("user-from-env"));
        assert_eq!(spec.to_string(), "user-from-env:");
    }

    #[test]
    fn test_uid_gid_spec() {
        let spec: UserSpec = "u::1234:4321:".parse().unwrap();
        assert_eq!(spec.name, "u");
        assert_eq!(spec.password, None);
        assert_eq!(spec.uid, Some(1234));
        assert_eq!(spec.gid, Some(4321));
        assert_eq!(spec.home_dir, None);
        assert_eq!(spec.to_string(), "u::1234:4321");
    }

    #[test]
    fn test_full_spec() {
        let spec = UserSpec::parse("bob:secret:1001:100:/data/bob:in,out").unwrap();
        assert_eq!(
            spec,
            UserSpec::new("bob")
                .password("secret")
                .uid(1001)
                .gid(100)
                .home_dir("/data/bob")
                .dir("in")
                .dir("out")
        );
        assert_eq!(spec.to_string(), "bob:secret:1001:100:/data/bob:in,out");
    }

    #[test]
    fn test_dirs_without_ids() {
        let spec = UserSpec::new("user").dir("dir1").dir("dir2");
        assert_eq!(spec.to_string(), "user:::::dir1,dir2");
        assert_eq!(UserSpec::parse(&spec.to_string()).unwrap(), spec);
    }

    #[test]
    fn test_wrong_field_counts() {
        assert!(matches!(UserSpec::parse("lonely"), Err(HarnessError::Parse(_))));
        assert!(matches!(UserSpec::parse("a:b:1:2:/h:d:extra"), Err(HarnessError::Parse(_))));
    }

    #[test]
    fn test_bad_fields() {
        assert!(UserSpec::parse(":pass").is_err());
        assert!(UserSpec::parse("u::abc:").is_err());
        assert!(UserSpec::parse("u::1:-2").is_err());
    }

    #[test]
    fn test_parse_env_list() {
        let specs = UserSpec::parse_list("user-from-env: user-from-env-2:").unwrap();
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["user-from-env", "user-from-env-2"]);
        assert_eq!(UserSpec::format_list(&specs), "user-from-env: user-from-env-2:");
    }

    #[test]
    fn test_parse_config_skips_comments() {
        let specs = UserSpec::parse_config("# users\n\nfoo::\n  bar:pw:2000  \n").unwrap();
        assert_eq!(
            specs,
            vec![UserSpec::new("foo"), UserSpec::new("bar").password("pw").uid(2000)]
        );
        assert_eq!(UserSpec::format_config(&specs), "foo:\nbar:pw:2000\n");
    }

    #[test]
    fn test_identity_parse() {
        let id =
            Identity::parse("uid=1234(u) gid=4321(group_4321) groups=4321(group_4321)\n").unwrap();
        assert_eq!(id.uid, 1234);
        assert_eq!(id.user, "u");
        assert_eq!(id.gid, 4321);
        assert_eq!(id.group, "group_4321");
        assert_eq!(id.groups, vec![(4321, "group_4321".to_string())]);
    }

    #[test]
    fn test_identity_multiple_groups() {
        let id =
            Identity::parse("uid=0(root) gid=0(root) groups=0(root),1(bin),2(daemon)").unwrap();
        assert_eq!(id.groups.len(), 3);
        assert_eq!(id.groups[2], (2, "daemon".to_string()));
    }

    #[test]
    fn test_identity_rejects_garbage() {
        assert!(Identity::parse("id: 'nobody-here': no such user").is_err());
    }
}
