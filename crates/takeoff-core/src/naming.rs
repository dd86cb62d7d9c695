//! Version names: a date-based base name, suffixed `-v2`, `-v3`, ... until it
//! collides with nothing the spreadsheet has ever used.

use crate::error::{Result, TakeoffError};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::Mutex;

/// Render `today` with a chrono format string.
pub fn base_name(today: NaiveDate, format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", today.format(format))
        .map_err(|_| TakeoffError::Invalid(format!("bad version name format '{format}'")))?;
    if out.trim().is_empty() {
        return Err(TakeoffError::Invalid(format!(
            "version name format '{format}' renders an empty name"
        )));
    }
    Ok(out)
}

/// First candidate absent from `taken`. Comparison ignores case, matching
/// the spreadsheet's own rule for tab titles.
pub fn generate_version_name<'a, I>(today: NaiveDate, format: &str, taken: I) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: HashSet<String> = taken.into_iter().map(|t| t.trim().to_lowercase()).collect();
    let base = base_name(today, format)?;
    if !taken.contains(&base.to_lowercase()) {
        return Ok(base);
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-v{n}");
        if !taken.contains(&candidate.to_lowercase()) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Issues version names and remembers the names it handed out per
/// spreadsheet, so a name is never issued twice by one process even before
/// the tracker write lands. Only the current day's names are kept: earlier
/// names sit in the tracker by then and carry a different date.
#[derive(Debug)]
pub struct VersionNamer {
    format: String,
    issued: Mutex<HashMap<String, (NaiveDate, HashSet<String>)>>,
}

impl VersionNamer {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            issued: Mutex::new(HashMap::new()),
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn next(
        &self,
        spreadsheet_id: &str,
        today: NaiveDate,
        tabs: &[String],
        tracker: &[String],
    ) -> Result<String> {
        let mut issued = self.issued.lock().unwrap_or_else(|e| e.into_inner());
        issued.retain(|_, (day, _)| *day == today);
        let (_, seen) = issued
            .entry(spreadsheet_id.to_string())
            .or_insert_with(|| (today, HashSet::new()));
        let name = generate_version_name(
            today,
            &self.format,
            tabs.iter()
                .chain(tracker.iter())
                .map(String::as_str)
                .chain(seen.iter().map(String::as_str)),
        )?;
        seen.insert(name.to_lowercase());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan15() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_inputs_give_base_name() {
        let name = generate_version_name(jan15(), "%m-%d-%Y", Vec::<&str>::new()).unwrap();
        assert_eq!(name, "01-15-2026");
    }

    #[test]
    fn deleted_tab_name_stays_retired() {
        let tabs = strings(&["Setup", "01-15-2026"]);
        let tracker = strings(&["01-15-2026", "01-10-2026"]);
        let name = generate_version_name(
            jan15(),
            "%m-%d-%Y",
            tabs.iter().chain(tracker.iter()).map(String::as_str),
        )
        .unwrap();
        assert_eq!(name, "01-15-2026-v2");

        // The tab is gone but the tracker still remembers it.
        let name = generate_version_name(
            jan15(),
            "%m-%d-%Y",
            ["01-15-2026", "01-15-2026-v2"],
        )
        .unwrap();
        assert_eq!(name, "01-15-2026-v3");
    }

    #[test]
    fn collisions_ignore_case() {
        let name = generate_version_name(jan15(), "v%Y%m%d", ["V20260115"]).unwrap();
        assert_eq!(name, "v20260115-v2");
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let a = generate_version_name(jan15(), "%Y-%m-%d", ["2026-01-15"]).unwrap();
        let b = generate_version_name(jan15(), "%Y-%m-%d", ["2026-01-15"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "2026-01-15-v2");
    }

    #[test]
    fn namer_never_repeats_within_a_process() {
        let namer = VersionNamer::new("%m-%d-%Y");
        let mut seen = HashSet::new();
        for _ in 0..5 {
            let name = namer.next("sheet-1", jan15(), &[], &[]).unwrap();
            assert!(seen.insert(name));
        }
        assert!(seen.contains("01-15-2026-v5"));
        // Other spreadsheets are independent.
        assert_eq!(namer.next("sheet-2", jan15(), &[], &[]).unwrap(), "01-15-2026");
    }

    #[test]
    fn namer_forgets_earlier_days() {
        let namer = VersionNamer::new("%m-%d-%Y");
        namer.next("sheet-1", jan15(), &[], &[]).unwrap();
        namer.next("sheet-2", jan15(), &[], &[]).unwrap();

        let jan16 = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        assert_eq!(namer.next("sheet-1", jan16, &[], &[]).unwrap(), "01-16-2026");
        assert_eq!(namer.next("sheet-1", jan16, &[], &[]).unwrap(), "01-16-2026-v2");

        let issued = namer.issued.lock().unwrap();
        assert_eq!(issued.len(), 1);
        let (day, names) = &issued["sheet-1"];
        assert_eq!(*day, jan16);
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn empty_format_is_rejected() {
        assert!(base_name(jan15(), "").is_err());
    }
}
