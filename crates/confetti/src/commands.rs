//! Administrative commands that name a colleague.

use chrono::Month;
use miette::Result;

use confetti_core::{Account, BirthDate, BirthdayRecord, BirthdayStore, Directory, mention};

/// The user id inside `<@U123>`, `<@U123|name>` or `@U123`. Anything else
/// is taken as the id itself.
pub fn user_id_from_reference(input: &str) -> &str {
    let token = input.trim();
    let token = token
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(token);
    let token = token.strip_prefix('@').unwrap_or(token);
    token.split('|').next().unwrap_or(token).trim()
}

fn user_not_found(input: &str) -> miette::Report {
    miette::miette!(
        code = "confetti::user_not_found",
        help = "pass a Slack user id such as U012AB3CD or a <@U012AB3CD> mention",
        "Could not find user {}",
        input.trim()
    )
}

/// Resolve a user reference through the directory.
pub async fn resolve_user(directory: &dyn Directory, input: &str) -> Result<Account> {
    let id = user_id_from_reference(input);
    if id.is_empty() {
        return Err(user_not_found(input));
    }
    match directory.lookup_account(id).await {
        Ok(Some(account)) => Ok(account),
        Ok(None) => Err(user_not_found(input)),
        Err(e) => Err(miette::miette!("failed to look up user {}: {}", input.trim(), e)),
    }
}

/// Record a birthday for a user the directory knows.
pub async fn set_birthday(
    store: &dyn BirthdayStore,
    directory: &dyn Directory,
    user: &str,
    date: BirthDate,
) -> Result<(Account, BirthdayRecord)> {
    let account = resolve_user(directory, user).await?;
    let record = store
        .upsert_birthday(&account.id, date)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    Ok((account, record))
}

/// Every known birthday with the person's directory name, falling back to a
/// mention when the directory has none.
pub async fn birthday_listing(
    store: &dyn BirthdayStore,
    directory: &dyn Directory,
) -> Result<String> {
    let records = store
        .list_birthdays()
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    let mut named = Vec::new();
    for record in records {
        if !record.birth_date.is_known() {
            continue;
        }
        let name = match directory.lookup_account(&record.person_id).await {
            Ok(Some(account)) if !account.display_name.trim().is_empty() => account.display_name,
            _ => mention(&record.person_id),
        };
        named.push((record, name));
    }

    Ok(format_birthdays(&named))
}

/// Render birthdays by month, in calendar order. Records without a date are
/// left out.
pub fn format_birthdays(entries: &[(BirthdayRecord, String)]) -> String {
    let mut known: Vec<(u32, u32, &str)> = entries
        .iter()
        .filter_map(|(record, name)| match record.birth_date {
            BirthDate::Known { day, month } => Some((month, day, name.as_str())),
            BirthDate::Unknown => None,
        })
        .collect();
    known.sort();

    if known.is_empty() {
        return "No birthdays recorded.\n".to_string();
    }

    let mut out = String::new();
    let mut current = None;
    for (month, day, name) in known {
        if current != Some(month) {
            let month_name = u8::try_from(month)
                .ok()
                .and_then(|m| Month::try_from(m).ok())
                .map(|m| m.name())
                .unwrap_or("Unknown");
            if current.is_some() {
                out.push('\n');
            }
            out.push_str(month_name);
            out.push('\n');
            current = Some(month);
        }
        out.push_str(&format!("  {:02}  {}\n", day, name));
    }
    out
}
