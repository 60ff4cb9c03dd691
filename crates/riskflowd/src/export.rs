use std::borrow::Cow;
use std::io::{self, Write};

use riskflow_core::{ChecklistRecord, Field, MatrixBound, ScoreView};

/// Lets spreadsheet tools detect UTF-8.
pub const CSV_BOM: &str = "\u{feff}";

const SCORE_HEADERS: [&str; 4] = ["위험도", "등급", "잔여 위험도", "잔여 등급"];

/// Quotes `value` when it contains a delimiter, a quote or a line break.
pub fn escape_csv(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn csv_line<'a>(cells: impl IntoIterator<Item = &'a str>) -> String {
    cells
        .into_iter()
        .map(escape_csv)
        .collect::<Vec<_>>()
        .join(",")
}

/// Writes every field of `records` plus their scores as CSV: BOM, one header
/// row of labels, LF between rows and no trailing newline.
pub fn write_checklist_csv<W: Write + ?Sized>(
    out: &mut W,
    records: &[&ChecklistRecord],
    bound: MatrixBound,
    accept_threshold: u32,
) -> io::Result<()> {
    let header = Field::ALL
        .into_iter()
        .map(Field::label)
        .chain(SCORE_HEADERS);
    let mut lines = vec![csv_line(header)];

    for record in records {
        let score = ScoreView::from_fields(&record.impact, &record.likelihood, bound, accept_threshold);
        let residual = ScoreView::from_fields(
            &record.residual_impact,
            &record.residual_likelihood,
            bound,
            accept_threshold,
        );
        let derived = [
            score.map(|view| view.score.to_string()).unwrap_or_default(),
            score.map(|view| view.grade.label().to_owned()).unwrap_or_default(),
            residual.map(|view| view.score.to_string()).unwrap_or_default(),
            residual.map(|view| view.grade.label().to_owned()).unwrap_or_default(),
        ];

        let cells = Field::ALL
            .into_iter()
            .map(|field| record.get(field))
            .chain(derived.iter().map(String::as_str));
        lines.push(csv_line(cells));
    }

    out.write_all(CSV_BOM.as_bytes())?;
    out.write_all(lines.join("\n").as_bytes())?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_only_quotes_when_needed() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("line\nbreak"), "\"line\nbreak\"");
        assert_eq!(escape_csv("cr\rhere"), "\"cr\rhere\"");
        assert!(matches!(escape_csv("접근통제"), Cow::Borrowed(_)));
    }

    #[test]
    fn export_has_bom_labels_and_scores() {
        let record = ChecklistRecord::new("1.1.1.1")
            .with(Field::Domain, "관리체계")
            .with(Field::Result, "취약")
            .with(Field::ResultDetail, "MFA, not enforced")
            .with(Field::Impact, "4")
            .with(Field::Likelihood, "3");

        let mut out = Vec::new();
        write_checklist_csv(&mut out, &[&record], MatrixBound::Five, 7).expect("write csv");
        let text = String::from_utf8(out).expect("utf-8");

        assert!(text.starts_with(CSV_BOM));
        assert!(!text.ends_with('\n'));
        let lines = text.trim_start_matches(CSV_BOM).split('\n').collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("유형,영역,분야,코드,항목"));
        assert!(lines[0].ends_with("위험도,등급,잔여 위험도,잔여 등급"));
        assert!(lines[1].contains(",1.1.1.1,"));
        assert!(lines[1].contains("\"MFA, not enforced\""));
        assert!(lines[1].ends_with(",12,Medium,,"));
    }

    #[test]
    fn empty_export_is_just_the_header() {
        let mut out = Vec::new();
        write_checklist_csv(&mut out, &[], MatrixBound::Five, 7).expect("write csv");
        let text = String::from_utf8(out).expect("utf-8");
        assert_eq!(text.matches('\n').count(), 0);
        assert!(text.contains("코드"));
    }
}
