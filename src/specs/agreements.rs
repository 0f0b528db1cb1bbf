// src/specs/agreements.rs
//
// One listing page → one result per table row.
// The table is the first `<table>` whose class mentions "agreement"; the first
// `<tr>` holding `<th>` cells names the columns. Every other `<tr>` with `<td>`
// cells is a unit. Bad units come back as `SourceError::Format` and the rest
// of the page still parses.

use chrono::NaiveDate;

use crate::{
    config::consts::DEFAULT_CREDITORS,
    core::{
        html::{self, attr_value, cell_text, find_block_with_class, open_tag, tag_blocks_ci},
        net::resolve_link,
        sanitize::{normalize_ws, parse_amount, split_currency, strip_brackets},
    },
    error::SourceError,
    record::{AgreementRecord, FieldValue, Fields, NaturalKey},
};

pub const COUNTRY: &str = "country";
pub const AGREEMENT_DATE: &str = "agreement_date";
pub const CREDITORS: &str = "creditors";
pub const TREATMENT: &str = "treatment";
pub const AMOUNT_TREATED: &str = "amount_treated";
pub const CURRENCY: &str = "currency";
pub const STATUS: &str = "status";
pub const SOURCE_URL: &str = "source_url";

/// Parse one page. `None` when the page has no agreements table at all.
pub fn parse_page(doc: &str, page_url: &str, page: u32) -> Option<Vec<Result<AgreementRecord, SourceError>>> {
    let table = find_block_with_class(doc, "table", "agreement")?;
    let mut columns: Option<Vec<String>> = None;
    let mut units = Vec::new();

    for tr in tag_blocks_ci(table, "<tr", "</tr>") {
        let lc = html::to_lower(tr);
        if columns.is_none() && lc.contains("<th") {
            let names = tag_blocks_ci(tr, "<th", "</th>").into_iter().map(|th| column_name(&cell_text(th))).collect();
            columns = Some(names);
            continue;
        }
        let cells: Vec<String> = tag_blocks_ci(tr, "<td", "</td>").into_iter().map(cell_text).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        let unit = format!("page {page} row {}", units.len() + 1);
        let result = match &columns {
            Some(cols) => parse_unit(&unit, cols, &cells, first_link(tr, page_url)),
            None => Err(SourceError::Format { unit: unit.clone(), reason: s!("data row before any header row") }),
        };
        units.push(result);
    }
    Some(units)
}

/// Canonical field name for a header cell. Unknown headers become snake_case.
pub fn column_name(header: &str) -> String {
    let h = normalize_ws(&strip_brackets(header)).trim_end_matches([':', '*']).trim().to_lowercase();
    let canonical = match h.as_str() {
        "country" | "debtor" | "debtor country" => COUNTRY,
        "date" | "date of agreement" | "agreement date" => AGREEMENT_DATE,
        "creditors" | "creditor group" => CREDITORS,
        "treatment" | "type of treatment" | "terms" => TREATMENT,
        "amount" | "amount treated" => AMOUNT_TREATED,
        "currency" => CURRENCY,
        "status" => STATUS,
        other => return other.split(|c: char| !c.is_alphanumeric()).filter(|p| !p.is_empty()).collect::<Vec<_>>().join("_"),
    };
    s!(canonical)
}

/// Accepts `2015-01-02`, `02/01/2015`, `2 January 2015`, `January 2, 2015` (and short month names).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d %B %Y", "%B %d, %Y", "%d %b %Y", "%b %d, %Y"];
    let t = normalize_ws(s);
    FORMATS.iter().find_map(|f| NaiveDate::parse_from_str(&t, f).ok())
}

fn first_link(tr: &str, page_url: &str) -> Option<String> {
    tag_blocks_ci(tr, "<a", "</a>")
        .into_iter()
        .find_map(|a| attr_value(open_tag(a), "href"))
        .filter(|href| !href.trim().is_empty() && !href.starts_with('#'))
        .map(|href| resolve_link(page_url, href.trim()))
}

fn parse_unit(unit: &str, columns: &[String], cells: &[String], link: Option<String>) -> Result<AgreementRecord, SourceError> {
    let bad = |reason: String| SourceError::Format { unit: s!(unit), reason };
    let mut fields = Fields::new();
    let mut date = None;
    let mut prefix_currency = None;

    for (col, raw) in columns.iter().zip(cells) {
        let value = strip_brackets(raw);
        if value.is_empty() || col.is_empty() {
            continue;
        }
        match col.as_str() {
            AGREEMENT_DATE => {
                let d = parse_date(&value).ok_or_else(|| bad(format!("unparsable date '{value}'")))?;
                date = Some(d);
                fields.insert(s!(AGREEMENT_DATE), FieldValue::Date(d));
            }
            AMOUNT_TREATED => {
                let (code, number) = split_currency(&value);
                let amount = parse_amount(number).ok_or_else(|| bad(format!("unparsable amount '{value}'")))?;
                prefix_currency = code.map(|c| s!(c));
                fields.insert(s!(AMOUNT_TREATED), FieldValue::Amount(amount));
            }
            _ => {
                fields.insert(col.clone(), FieldValue::Text(value));
            }
        }
    }

    let country = match fields.get(COUNTRY) {
        Some(v) => v.to_cell(),
        None => return Err(bad(s!("missing country"))),
    };
    let date = date.ok_or_else(|| bad(s!("missing agreement date")))?;
    if !fields.contains_key(CREDITORS) {
        fields.insert(s!(CREDITORS), DEFAULT_CREDITORS.into());
    }
    if let Some(code) = prefix_currency {
        fields.entry(s!(CURRENCY)).or_insert(FieldValue::Text(code));
    }
    if let Some(url) = link {
        fields.insert(s!(SOURCE_URL), FieldValue::Text(url));
    }

    let creditors = fields.get(CREDITORS).map(FieldValue::to_cell).unwrap_or_default();
    Ok(AgreementRecord::new(NaturalKey::derive(&country, date, &creditors), fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <table class="menu"><tr><td>Home</td></tr></table>
        <table class="views-table agreements">
          <thead><tr><th>Country</th><th>Date of agreement</th><th>Type of treatment</th><th>Amount treated</th><th>Status</th></tr></thead>
          <tbody>
            <tr><td><a href="/en/chad-2015">Chad</a></td><td>2 January 2015</td><td>Cologne terms [1]</td><td>USD 1,234.5</td><td>Signed</td></tr>
            <tr><td>Togo</td><td>12/06/2010</td><td>Cologne</td><td>98 000</td><td></td></tr>
            <tr><td>Niger</td><td>sometime</td><td>Naples</td><td>1</td><td>Signed</td></tr>
          </tbody>
        </table></body></html>"#;

    #[test]
    fn parses_rows_and_flags_bad_ones() {
        let units = parse_page(PAGE, "https://clubdeparis.org/en/agreements?page=1", 1).unwrap();
        assert_eq!(units.len(), 3);

        let chad = units[0].as_ref().unwrap();
        assert_eq!(chad.natural_key().as_str(), "chad|2015-01-02|paris-club");
        assert_eq!(chad.field(TREATMENT).unwrap().to_cell(), "Cologne terms");
        assert_eq!(chad.field(AMOUNT_TREATED), Some(&FieldValue::Amount(1234.5)));
        assert_eq!(chad.field(CURRENCY).unwrap().to_cell(), "USD");
        assert_eq!(chad.field(SOURCE_URL).unwrap().to_cell(), "https://clubdeparis.org/en/chad-2015");

        let togo = units[1].as_ref().unwrap();
        assert_eq!(togo.field(AGREEMENT_DATE).unwrap().to_cell(), "2010-06-12");
        assert!(togo.field(STATUS).is_none());

        assert!(matches!(&units[2], Err(SourceError::Format { unit, .. }) if unit == "page 1 row 3"));
    }

    #[test]
    fn page_without_table() {
        assert!(parse_page("<p>maintenance</p>", "https://x/", 1).is_none());
    }

    #[test]
    fn header_aliases() {
        assert_eq!(column_name("Debtor country"), COUNTRY);
        assert_eq!(column_name("Agreement date:"), AGREEMENT_DATE);
        assert_eq!(column_name("Creditor group"), CREDITORS);
        assert_eq!(column_name("Notes (public)"), "notes_public");
    }

    #[test]
    fn date_notations() {
        let want = NaiveDate::from_ymd_opt(2012, 6, 15);
        for s in ["2012-06-15", "15/06/2012", "15 June 2012", "June 15, 2012", "15 Jun 2012"] {
            assert_eq!(parse_date(s), want, "{s}");
        }
        assert_eq!(parse_date("2012"), None);
    }

    #[test]
    fn missing_country_is_a_format_error() {
        let doc = r#"<table class="agreements"><tr><th>Country</th><th>Date</th></tr><tr><td></td><td>2015-01-01</td></tr></table>"#;
        let units = parse_page(doc, "https://x/", 2).unwrap();
        assert!(matches!(&units[0], Err(SourceError::Format { reason, .. }) if reason.contains("country")));
    }
}
