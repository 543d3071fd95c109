use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};

/// This is the standard way of converting a date to a string in dayrecap.
pub fn date_to_report_name(date: NaiveDate) -> String {
    format!("{}.md", date.format("%Y-%m-%d"))
}

/// Wall clock time in the local timezone. The daily cycle follows local days.
pub fn to_local_naive(moment: DateTime<Utc>) -> NaiveDateTime {
    moment.with_timezone(&Local).naive_local()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::date_to_report_name;

    #[test]
    fn test_report_name() {
        let date = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();
        assert_eq!(date_to_report_name(date), "2018-07-04.md");
    }
}
