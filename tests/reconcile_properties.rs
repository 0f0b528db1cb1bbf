// tests/reconcile_properties.rs
use chrono::NaiveDate;
use rand::{rngs::StdRng, Rng, SeedableRng};

use parisclub_sync::{
    reconcile, row, s,
    record::{AgreementRecord, Fields, NaturalKey, RowPosition, Schema, StoreRow},
};

const COUNTRIES: &[&str] = &["Chad", "Togo", "Niger", "Mali", "Benin", "Guinea", "Gabon", "Kenya"];

fn schema() -> Schema {
    Schema::new(row!["key", "country", "agreement_date", "amount_treated", "status"], "key").unwrap()
}

fn agreement(country: &str, year: i32, amount: f64, status: &str) -> AgreementRecord {
    let date = NaiveDate::from_ymd_opt(year, 1, 15).unwrap();
    let mut f = Fields::new();
    f.insert(s!("country"), country.into());
    f.insert(s!("agreement_date"), date.into());
    f.insert(s!("amount_treated"), amount.into());
    if !status.is_empty() {
        f.insert(s!("status"), status.into());
    }
    AgreementRecord::new(NaturalKey::derive(country, date, "Paris Club"), f)
}

fn random_batch(rng: &mut StdRng, n: usize) -> Vec<AgreementRecord> {
    (0..n)
        .map(|_| {
            let country = COUNTRIES[rng.random_range(0..COUNTRIES.len())];
            let year = rng.random_range(1990..1995);
            let amount = rng.random_range(1..4) as f64 * 50.0;
            let status = if rng.random_bool(0.5) { "Signed" } else { "" };
            agreement(country, year, amount, status)
        })
        .collect()
}

/// What the store would hold after writing `records` to an empty table.
fn stored(records: &[AgreementRecord]) -> Vec<StoreRow> {
    let schema = schema();
    records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| schema.parse_row(RowPosition::FIRST_DATA.offset(i), &schema.render(r)))
        .collect()
}

#[test]
fn reconcile_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        let current = stored(&random_batch(&mut rng, 12));
        let fresh = random_batch(&mut rng, 15);
        assert_eq!(reconcile(&current, &fresh), reconcile(&current, &fresh));
    }
}

#[test]
fn applying_the_changes_converges() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let fresh = random_batch(&mut rng, 15);
        let first = reconcile(&[], &fresh);

        // Write what the first pass asked for, then reconcile again.
        let after = stored(&first.to_insert);
        let second = reconcile(&after, &fresh);
        assert!(second.is_empty(), "{second:?}");
        assert_eq!(second.unchanged, first.to_insert.len());
    }
}

#[test]
fn fingerprint_drives_updates() {
    let current = stored(&[agreement("Chad", 2001, 100.0, "Signed")]);

    let same = reconcile(&current, &[agreement("Chad", 2001, 100.0, "Signed")]);
    assert!(same.is_empty());
    assert_eq!(same.unchanged, 1);

    let changed = reconcile(&current, &[agreement("Chad", 2001, 150.0, "Signed")]);
    assert_eq!(changed.to_update.len(), 1);
    assert_eq!(changed.to_update[0].0.row_position(), RowPosition::FIRST_DATA);
    assert!(changed.to_insert.is_empty());
}

#[test]
fn upstream_duplicate_yields_one_insert_with_last_value() {
    let fresh = vec![agreement("Chad", 2001, 1.0, ""), agreement("Chad", 2001, 2.0, "")];
    let cs = reconcile(&[], &fresh);
    assert_eq!(cs.to_insert, vec![fresh[1].clone()]);
    assert_eq!(cs.warnings.len(), 1);
}

#[test]
fn every_fresh_key_is_classified_exactly_once() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..20 {
        let current = stored(&random_batch(&mut rng, 10));
        let fresh = random_batch(&mut rng, 20);
        let cs = reconcile(&current, &fresh);

        let mut distinct: Vec<&NaturalKey> = fresh.iter().map(|r| r.natural_key()).collect();
        distinct.sort();
        distinct.dedup();
        assert_eq!(cs.to_insert.len() + cs.to_update.len() + cs.unchanged, distinct.len());
    }
}

#[test]
fn output_follows_fetch_order() {
    let fresh = vec![
        agreement("Togo", 2001, 1.0, ""),
        agreement("Chad", 2001, 1.0, ""),
        agreement("Mali", 2001, 1.0, ""),
    ];
    let cs = reconcile(&[], &fresh);
    let order: Vec<String> = cs.to_insert.iter().map(|r| s!(r.natural_key().as_str())).collect();
    assert_eq!(order, vec!["togo|2001-01-15|paris-club", "chad|2001-01-15|paris-club", "mali|2001-01-15|paris-club"]);
}
