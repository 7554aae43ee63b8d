//! Baseline generation: walk each rule's start-point on the live
//! filesystem and write the calculated property set into the database
//! (spec.md §4.9).

use fim_calculator::{CalcFlags, CollidePolicy, PropertyCalculator};
use fim_datasource::{DataSourceIterator, FsCollaborator};
use fim_db::DatabaseIterator;
use fim_error::ErrorBucket;
use fim_policy_ast::{Rule, SpecList};
use fim_types::CryptoCollaborator;

/// Generate a baseline for every rule in `spec`, in canonical order.
/// Returns the number of objects written. A rule whose start-point is
/// unreadable on the live filesystem is skipped with an error pushed to
/// `errors`, not a fatal abort of the whole run.
pub fn generate_baseline<FS, F, C>(
    spec: &SpecList,
    fs: &mut FS,
    db: &mut DatabaseIterator,
    calc: &PropertyCalculator<'_, F, C>,
    errors: &mut ErrorBucket,
) -> usize
where
    FS: DataSourceIterator,
    F: FsCollaborator,
    C: CryptoCollaborator,
{
    let mut scanned = 0usize;
    for rule in spec.rules() {
        fs.seek_to(&rule.start);
        if fs.done() {
            let display = fim_name::to_string_display(&rule.start);
            errors.push(format!("start-point unreadable: {display}"), Some(display), true);
            continue;
        }
        store_subtree(rule, fs, db, calc, errors, &mut scanned);
    }
    scanned
}

fn store_subtree<FS, F, C>(
    rule: &Rule,
    fs: &mut FS,
    db: &mut DatabaseIterator,
    calc: &PropertyCalculator<'_, F, C>,
    errors: &mut ErrorBucket,
    scanned: &mut usize,
) where
    FS: DataSourceIterator,
    F: FsCollaborator,
    C: CryptoCollaborator,
{
    let Some(name) = fs.get_name() else { return };

    let mut fco = match fs.create_fco() {
        Ok(fco) => fco,
        Err(e) => {
            let display = fim_name::to_string_display(&name);
            errors.push(format!("failed to create FCO for {display}: {e}"), Some(display), false);
            return;
        }
    };
    calc.calculate(&mut fco, &rule.mask, CollidePolicy::Overwrite, CalcFlags::empty(), errors);
    db.add_fco(&name, &fco.props);
    *scanned += 1;

    if rule.should_stop_descent(&name) || !fs.can_descend() {
        return;
    }
    fs.descend();
    while !fs.done() {
        store_subtree(rule, fs, db, calc, errors, scanned);
        fs.next();
    }
    fs.ascend();
}
