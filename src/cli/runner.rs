use std::io::Write;

use super::command::Command;
use crate::models::{User, UserRepository, fake_users};
use crate::session::Session;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn write_users<W: Write>(out: &mut W, users: &[User]) -> CliResult {
    // One JSON document per line
    for u in users {
        writeln!(out, "{}", serde_json::to_string(u)?)?;
    }
    Ok(())
}

/// Execute `cmd` against `session`, writing results to `out` as NDJSON or plain text.
///
/// # Errors
/// Propagates session and output errors.
pub fn run<W: Write>(session: &Session, cmd: Command, out: &mut W) -> CliResult {
    let users = UserRepository::new(session.clone());
    match cmd {
        Command::UserAdd { name, email } => {
            let u = users.add(User::new(name, email))?;
            write_users(out, &[u])
        }
        Command::UserEdit { id, name, email } => {
            let u = users.edit(User { id: Some(id), name, email })?;
            write_users(out, &[u])
        }
        Command::UserGet { id } => match users.find_by_id(&id)? {
            Some(u) => write_users(out, &[u]),
            None => Err(crate::errors::SessionError::NoSuchDocument(id).into()),
        },
        Command::UserList => write_users(out, &users.get_all()?),
        Command::UserDelete { id } => {
            let deleted = users.delete(&id)?;
            writeln!(out, "deleted={deleted}")?;
            Ok(())
        }
        Command::UserSearch { pattern } => write_users(out, &users.search(&pattern)?),
        Command::UserFind { needle } => write_users(out, &users.lambda_search(&needle)?),
        Command::UserPage { params } => write_users(out, &users.get_page(&params)?),
        Command::UserCount { params } => {
            let n = match params {
                Some(p) => session.count_matching::<User>(&p)?,
                None => session.count::<User>()?,
            };
            writeln!(out, "{n}")?;
            Ok(())
        }
        Command::UserSeed { count } => {
            let mut batch = fake_users(count);
            session.add_many(&mut batch)?;
            writeln!(out, "inserted={}", batch.len())?;
            Ok(())
        }
        Command::UserDrop => {
            session.drop_collection::<User>()?;
            writeln!(out, "dropped=User")?;
            Ok(())
        }
        Command::EnsureTtl => {
            session.ensure_ttl_index::<User>()?;
            writeln!(out, "ttl index ready")?;
            Ok(())
        }
        Command::EnsureTextIndex { fields } => {
            let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
            session.ensure_text_index::<User>(&refs)?;
            writeln!(out, "text index ready")?;
            Ok(())
        }
        Command::UserTextSearch { search, skip, limit } => {
            write_users(out, &session.text_search_paged::<User>(&search, skip, limit, None)?)
        }
        Command::Metrics => {
            write!(out, "{}", session.telemetry().metrics_text())?;
            Ok(())
        }
    }
}
