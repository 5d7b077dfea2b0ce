/// Hand a rendered report to the outside world.
///
/// The real transport is a sendmail-style pipe: the message (headers plus
/// body) is staged in a temp file and fed to the sendmail binary on stdin
/// with `-t`, so the recipient list lives in the headers and never touches
/// a shell.  The temp file is removed whether the call succeeds or fails.
/// Dry runs print the same message to stdout instead.
use anyhow::{bail, Context, Result};
use std::io::{Seek, SeekFrom, Write};
use subprocess::{Exec, Redirection};
use tempfile::NamedTempFile;

pub enum Transport {
    Sendmail { path: String },
    Stdout,
}

pub fn deliver(
    transport: &Transport,
    from: &str,
    recipients: &[String],
    subject: &str,
    body: &str,
) -> Result<()> {
    let message = compose(from, recipients, subject, body);
    match transport {
        Transport::Stdout => {
            print!("{}", message);
            Ok(())
        }
        Transport::Sendmail { path } => {
            if recipients.is_empty() {
                bail!("No mail recipients configured");
            }
            let mut staged =
                NamedTempFile::new().context("Cannot create mail staging file")?;
            staged.write_all(message.as_bytes())?;
            staged.flush()?;
            let mut handle = staged.reopen()?;
            handle.seek(SeekFrom::Start(0))?;
            let capture = Exec::cmd(path)
                .arg("-t")
                .stdin(Redirection::File(handle))
                .stdout(Redirection::Pipe)
                .stderr(Redirection::Merge)
                .capture()
                .with_context(|| format!("Cannot run mail program '{path}'"))?;
            // The staging file is dropped (and unlinked) on every path out
            // of this function.
            if !capture.exit_status.success() {
                bail!(
                    "Mail program '{}' failed: {}",
                    path,
                    capture.stdout_str().trim()
                );
            }
            Ok(())
        }
    }
}

fn compose(from: &str, recipients: &[String], subject: &str, body: &str) -> String {
    let mut msg = String::new();
    msg.push_str(&format!("To: {}\n", recipients.join(", ")));
    if !from.is_empty() {
        msg.push_str(&format!("From: {}\n", from));
    }
    msg.push_str(&format!("Subject: {}\n", subject));
    msg.push_str("Auto-Submitted: auto-generated\n");
    msg.push('\n');
    msg.push_str(body);
    if !body.ends_with('\n') {
        msg.push('\n');
    }
    msg
}

#[test]
fn test_compose() {
    let msg = compose(
        "me@here",
        &["a@x".to_string(), "b@y".to_string()],
        "the subject",
        "the body\n",
    );
    assert!(
        msg == "To: a@x, b@y\n\
                From: me@here\n\
                Subject: the subject\n\
                Auto-Submitted: auto-generated\n\
                \n\
                the body\n"
    );
}

#[test]
fn test_compose_without_from_adds_final_newline() {
    let msg = compose("", &["a@x".to_string()], "s", "body");
    assert!(!msg.contains("From:"));
    assert!(msg.ends_with("\nbody\n"));
}

#[test]
fn test_sendmail_needs_recipients() {
    let t = Transport::Sendmail {
        path: "/usr/sbin/sendmail".to_string(),
    };
    assert!(deliver(&t, "me", &[], "s", "b").is_err());
}
