//! Access to the router's `mwan3` configuration through `uci`.
//!
//! # Line grammar
//!
//! `uci show` prints one assignment per line:
//!
//! ```text
//! line    := ident '.' section '.' ident '=' '\'' value '\''
//! section := ident | '@' ident '[' '-'? [0-9]+ ']'
//! ident   := [A-Za-z0-9_-]+
//! value   := any characters except '\'' and whitespace
//! ```
//!
//! Lines that do not match (section headers such as `mwan3.wan=interface`,
//! list entries, blank lines, shell noise) are skipped, never rejected.
//! Anonymous sections (`mwan3.@member[0].interface='wan'`) resolve like named
//! ones; their brackets are quoted whenever they reach a shell command.

use std::borrow::Cow;
use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::channel::CommandChannel;
use crate::error::UciError;

const NAMESPACE: &str = "mwan3";
const LIVE_CONFIG: &str = "/etc/config/mwan3";
const BACKUP_PATH: &str = "/tmp/mwan3.backup";

/// One `namespace.section.option='value'` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UciAssignment {
    pub namespace: String,
    pub section: String,
    pub option: String,
    pub value: String,
}

/// Result of parsing a `uci show` dump.
#[derive(Debug, Default)]
pub struct ParsedConfig {
    pub assignments: Vec<UciAssignment>,
    pub skipped: usize,
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// A named section, or an anonymous `@type[index]` reference.
fn is_section(s: &str) -> bool {
    if is_ident(s) {
        return true;
    }
    let Some((ty, index)) = s
        .strip_prefix('@')
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|rest| rest.split_once('['))
    else {
        return false;
    };
    let digits = index.strip_prefix('-').unwrap_or(index);
    is_ident(ty) && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// `section` as a shell word; anonymous references carry glob characters.
fn shell_section(section: &str) -> Cow<'_, str> {
    if is_ident(section) {
        Cow::Borrowed(section)
    } else {
        Cow::Owned(format!("'{section}'"))
    }
}

/// Parse a single line; `None` if it does not follow the grammar.
pub fn parse_line(line: &str) -> Option<UciAssignment> {
    let (key, rhs) = line.trim().split_once('=')?;
    let value = rhs.strip_prefix('\'')?.strip_suffix('\'')?;
    if value.chars().any(|c| c == '\'' || c.is_whitespace()) {
        return None;
    }

    let mut parts = key.split('.');
    let (namespace, section, option) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some()
        || !is_ident(namespace)
        || !is_section(section)
        || !is_ident(option)
    {
        return None;
    }

    Some(UciAssignment {
        namespace: namespace.to_owned(),
        section: section.to_owned(),
        option: option.to_owned(),
        value: value.to_owned(),
    })
}

/// Parse a whole dump, counting the blank-or-unparseable lines.
pub fn parse_assignments(raw: &str) -> ParsedConfig {
    let mut parsed = ParsedConfig::default();
    for line in raw.lines() {
        match parse_line(line) {
            Some(a) => parsed.assignments.push(a),
            None if line.trim().is_empty() => {}
            None => parsed.skipped += 1,
        }
    }
    parsed
}

/// Map each WAN interface to the `mwan3` member that references it.
///
/// When two members name the same interface the last one wins.
pub fn resolve_member_mapping(raw: &str) -> HashMap<String, String> {
    let parsed = parse_assignments(raw);
    if parsed.skipped > 0 {
        debug!(skipped = parsed.skipped, "ignored non-assignment lines in uci output");
    }
    parsed
        .assignments
        .into_iter()
        .filter(|a| a.namespace == NAMESPACE && a.option == "interface")
        .map(|a| (a.value, a.section))
        .collect()
}

/// Structured operations on the remote load-balancer configuration.
#[async_trait]
pub trait ConfigClient: Send + Sync {
    /// Raw `uci show mwan3` output.
    async fn fetch_config(&self) -> Result<String, UciError>;
    async fn set_member_weight(&self, member: &str, weight: u32) -> Result<(), UciError>;
    async fn commit(&self) -> Result<(), UciError>;
    async fn restart(&self) -> Result<(), UciError>;
    /// Raw `mwan3 status` output.
    async fn status(&self) -> Result<String, UciError>;
    /// Copy the live configuration aside and return the backup path.
    async fn backup(&self) -> Result<String, UciError>;
    async fn rollback(&self, backup_path: &str) -> Result<(), UciError>;
}

/// [`ConfigClient`] that drives `uci` over a [`CommandChannel`].
#[derive(Debug, Clone)]
pub struct UciClient {
    channel: CommandChannel,
}

impl UciClient {
    pub fn new(channel: CommandChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ConfigClient for UciClient {
    async fn fetch_config(&self) -> Result<String, UciError> {
        Ok(self.channel.execute(format!("uci show {NAMESPACE}")).await?)
    }

    async fn set_member_weight(&self, member: &str, weight: u32) -> Result<(), UciError> {
        if !is_section(member) {
            return Err(UciError::InvalidSection(member.to_owned()));
        }
        let section = shell_section(member);
        self.channel
            .execute(format!("uci set {NAMESPACE}.{section}.weight='{weight}'"))
            .await?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), UciError> {
        self.channel.execute(format!("uci commit {NAMESPACE}")).await?;
        Ok(())
    }

    async fn restart(&self) -> Result<(), UciError> {
        self.channel.execute(format!("/etc/init.d/{NAMESPACE} restart")).await?;
        Ok(())
    }

    async fn status(&self) -> Result<String, UciError> {
        Ok(self.channel.execute(format!("{NAMESPACE} status")).await?)
    }

    async fn backup(&self) -> Result<String, UciError> {
        let out = self
            .channel
            .execute(format!("cp {LIVE_CONFIG} {BACKUP_PATH} && echo {BACKUP_PATH}"))
            .await?;
        Ok(out.trim().to_owned())
    }

    async fn rollback(&self, backup_path: &str) -> Result<(), UciError> {
        if backup_path.is_empty() {
            return Err(UciError::EmptyBackupPath);
        }
        self.channel.execute(format!("cp {backup_path} {LIVE_CONFIG}")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::channel::Transport;
    use crate::error::ChannelError;

    use super::*;

    const SHOW: &str = "\
mwan3.globals=globals
mwan3.globals.mmx_mask='0x3F00'
mwan3.wan=interface
mwan3.wan.enabled='1'
mwan3.wan_m1_w2=member
mwan3.wan_m1_w2.interface='wan'
mwan3.wan_m1_w2.metric='1'
mwan3.wanb_m1_w3=member
mwan3.wanb_m1_w3.interface='wanb'
mwan3.balanced.use_member='wan_m1_w2' 'wanb_m1_w3'
";

    #[test]
    fn single_member_line_resolves() {
        let m = resolve_member_mapping("mwan3.wan_m1_w2.interface='wan'");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("wan").map(String::as_str), Some("wan_m1_w2"));
    }

    #[test]
    fn realistic_dump_resolves_every_member() {
        let m = resolve_member_mapping(SHOW);
        assert_eq!(m.len(), 2);
        assert_eq!(m["wan"], "wan_m1_w2");
        assert_eq!(m["wanb"], "wanb_m1_w3");
    }

    #[test]
    fn malformed_lines_are_skipped_and_counted() {
        let raw = "garbage\nmwan3.x.interface=wan\nmwan3.a.b.c.interface='wan'\n\nmwan3.m.interface='wan'";
        let parsed = parse_assignments(raw);
        assert_eq!(parsed.assignments.len(), 1);
        assert_eq!(parsed.skipped, 3);
    }

    #[test]
    fn other_namespaces_do_not_contribute() {
        let m = resolve_member_mapping("network.lan.interface='wan'\nfirewall.z.interface='wan'");
        assert!(m.is_empty());
    }

    #[test]
    fn duplicate_interface_keeps_last_member() {
        let m = resolve_member_mapping(
            "mwan3.first.interface='wan'\nmwan3.second.interface='wan'",
        );
        assert_eq!(m["wan"], "second");
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let a = parse_line("  mwan3.wan_m1.interface='wan'\r").expect("parses");
        assert_eq!(a.section, "wan_m1");
        assert_eq!(a.value, "wan");
    }

    #[test]
    fn anonymous_member_sections_resolve() {
        let raw = "\
mwan3.@member[0]=member
mwan3.@member[0].interface='wan'
mwan3.@member[-1].interface='wanb'
";
        let m = resolve_member_mapping(raw);
        assert_eq!(m["wan"], "@member[0]");
        assert_eq!(m["wanb"], "@member[-1]");
    }

    #[test]
    fn malformed_anonymous_sections_are_skipped() {
        for line in [
            "mwan3.@member[].interface='wan'",
            "mwan3.@member[x].interface='wan'",
            "mwan3.member[0].interface='wan'",
            "mwan3.@[0].interface='wan'",
            "mwan3.@member[0]x.interface='wan'",
        ] {
            assert_eq!(parse_line(line), None, "{line}");
        }
    }

    /// Records every command and answers from a fixed table.
    struct ScriptedTransport {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn run(&mut self, command: &str) -> Result<String, ChannelError> {
            self.log.lock().expect("log lock").push(command.to_owned());
            if command.starts_with("cp /etc/config/mwan3") {
                return Ok("/tmp/mwan3.backup\n".into());
            }
            Ok(String::new())
        }
    }

    fn client() -> (UciClient, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let channel = CommandChannel::spawn(ScriptedTransport { log: Arc::clone(&log) }, 4);
        (UciClient::new(channel), log)
    }

    #[tokio::test]
    async fn commands_match_router_cli() {
        let (uci, log) = client();
        uci.set_member_weight("wan_m1_w2", 10).await.unwrap();
        uci.commit().await.unwrap();
        uci.restart().await.unwrap();
        let path = uci.backup().await.unwrap();
        uci.rollback(&path).await.unwrap();

        assert_eq!(path, "/tmp/mwan3.backup");
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "uci set mwan3.wan_m1_w2.weight='10'",
                "uci commit mwan3",
                "/etc/init.d/mwan3 restart",
                "cp /etc/config/mwan3 /tmp/mwan3.backup && echo /tmp/mwan3.backup",
                "cp /tmp/mwan3.backup /etc/config/mwan3",
            ]
        );
    }

    #[tokio::test]
    async fn empty_backup_path_fails_without_remote_call() {
        let (uci, log) = client();
        assert!(matches!(uci.rollback("").await, Err(UciError::EmptyBackupPath)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn anonymous_member_is_quoted_for_the_shell() {
        let (uci, log) = client();
        uci.set_member_weight("@member[2]", 5).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["uci set mwan3.'@member[2]'.weight='5'"]);
    }

    #[tokio::test]
    async fn hostile_member_name_is_refused() {
        let (uci, log) = client();
        let err = uci.set_member_weight("x; reboot", 1).await.unwrap_err();
        assert!(matches!(err, UciError::InvalidSection(_)));
        let err = uci.set_member_weight("@member[0]'; reboot; '", 1).await.unwrap_err();
        assert!(matches!(err, UciError::InvalidSection(_)));
        assert!(log.lock().unwrap().is_empty());
    }
}
