//! Policy update: run the merge-walk against a new spec list, refresh
//! nodes it still covers, and prune the ones it no longer does
//! (spec.md §4.9, §4.7).

use bitflags::bitflags;

use fim_calculator::{CalcFlags, CollidePolicy, PropertyCalculator};
use fim_datasource::{DataSourceIterator, FsCollaborator};
use fim_db::DatabaseIterator;
use fim_fco::{PropertySet, PropertyValue, PropertyVector};
use fim_name::Name;
use fim_policy_ast::{Rule, SpecList};
use fim_types::{CryptoCollaborator, Genre};

use crate::merge_walk::merge_walk;
use crate::report::{ChangedEntry, Report};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PolicyUpdateFlags: u32 {
        /// Narrow the refresh request to properties the database already
        /// holds, rather than the new rule's whole mask.
        const COMPARE_VALID_PROPS_ONLY = 0b0001;
        /// Drop database properties the new rule's mask no longer
        /// names, instead of leaving them stale.
        const INVALIDATE_EXTRA_DB_PROPS = 0b0010;
        /// Calculate and store every property the new rule's mask
        /// names, including ones the database never held before.
        const SET_NEW_PROPS = 0b0100;
        /// Before discarding a property's stored bytes (pruning a node,
        /// or invalidating an extra property), overwrite them with
        /// zeros first rather than merely dropping the reference. Also
        /// makes every discrepancy encountered along the way fatal to
        /// its enclosing rule rather than merely reported.
        const SECURE = 0b1000;
    }
}

fn push_error(report: &mut Report, flags: PolicyUpdateFlags, message: String, object: Option<String>) {
    report.errors.push(message, object, flags.contains(PolicyUpdateFlags::SECURE));
}

/// Reconcile `database` against `new_spec`, driving the shared
/// merge-walk per rule exactly as [`crate::check_integrity`] does:
/// `Added` entries are reported only if `old_spec` already covered
/// them (otherwise they are simply newly in-scope, not an anomaly);
/// `Removed`/`Changed` entries are always reported, since the walk
/// only visits names a `new_spec` rule covers. `Changed` handling also
/// refreshes the stored property set per `flags` before recording the
/// comparison. After every rule has been walked, prunes any database
/// node no rule of `new_spec` covers any more.
pub fn update_policy<FS, F, C>(
    old_spec: &SpecList,
    new_spec: &SpecList,
    genre: Genre,
    db: &mut DatabaseIterator,
    fs: &mut FS,
    calc: &PropertyCalculator<'_, F, C>,
    flags: PolicyUpdateFlags,
    report: &mut Report,
) where
    FS: DataSourceIterator,
    F: FsCollaborator,
    C: CryptoCollaborator,
{
    for rule in new_spec.rules() {
        db.seek_to(&rule.start);
        fs.seek_to(&rule.start);
        handle_one(rule, old_spec, genre, db, fs, calc, flags, report);

        if rule.should_stop_descent(&rule.start) || db.done() || fs.done() {
            continue;
        }
        merge_walk(
            db,
            fs,
            &mut |name| rule.should_stop_descent(name),
            &mut |name, fs_iter| on_added(name, old_spec, fs_iter, rule, calc, flags, report),
            &mut |name, db_iter| on_removed(name, db_iter, flags, report),
            &mut |name, db_iter, fs_iter| on_changed(name, genre, db_iter, fs_iter, rule, calc, flags, report),
        );
    }

    prune_orphans(new_spec, genre, db, flags, report);
}

#[allow(clippy::too_many_arguments)]
fn handle_one<FS, F, C>(
    rule: &Rule,
    old_spec: &SpecList,
    genre: Genre,
    db: &mut DatabaseIterator,
    fs: &mut FS,
    calc: &PropertyCalculator<'_, F, C>,
    flags: PolicyUpdateFlags,
    report: &mut Report,
) where
    FS: DataSourceIterator,
    F: FsCollaborator,
    C: CryptoCollaborator,
{
    match (db.done(), fs.done()) {
        (true, true) => {}
        (true, false) => on_added(&rule.start.clone(), old_spec, fs, rule, calc, flags, report),
        (false, true) => on_removed(&rule.start.clone(), db, flags, report),
        (false, false) => on_changed(&rule.start.clone(), genre, db, fs, rule, calc, flags, report),
    }
}

fn on_added<FS, F, C>(
    name: &Name,
    old_spec: &SpecList,
    fs: &mut FS,
    rule: &Rule,
    calc: &PropertyCalculator<'_, F, C>,
    flags: PolicyUpdateFlags,
    report: &mut Report,
) where
    FS: DataSourceIterator,
    F: FsCollaborator,
    C: CryptoCollaborator,
{
    let Ok(mut fco) = fs.create_fco() else {
        let display = fim_name::to_string_display(name);
        push_error(report, flags, format!("failed to create FCO for {display}"), Some(display));
        return;
    };
    calc.calculate(&mut fco, &rule.mask, CollidePolicy::Overwrite, CalcFlags::empty(), &mut report.errors);
    report.objects_scanned += 1;
    if old_spec.spec_contains(name) {
        report.added.push(fco);
    }
}

fn on_removed(name: &Name, db: &mut DatabaseIterator, flags: PolicyUpdateFlags, report: &mut Report) {
    match db.create_fco() {
        Ok(fco) => report.removed.push(fco),
        Err(e) => {
            let display = fim_name::to_string_display(name);
            push_error(report, flags, format!("failed to read database entry for {display}: {e}"), Some(display));
        }
    }
    report.objects_scanned += 1;
}

#[allow(clippy::too_many_arguments)]
fn on_changed<FS, F, C>(
    name: &Name,
    genre: Genre,
    db: &mut DatabaseIterator,
    fs: &mut FS,
    rule: &Rule,
    calc: &PropertyCalculator<'_, F, C>,
    flags: PolicyUpdateFlags,
    report: &mut Report,
) where
    FS: DataSourceIterator,
    F: FsCollaborator,
    C: CryptoCollaborator,
{
    let old = match db.create_fco() {
        Ok(fco) => fco,
        Err(e) => {
            let display = fim_name::to_string_display(name);
            push_error(report, flags, format!("failed to read database entry for {display}: {e}"), Some(display));
            return;
        }
    };
    let mut new = match fs.create_fco() {
        Ok(fco) => fco,
        Err(e) => {
            let display = fim_name::to_string_display(name);
            push_error(report, flags, format!("failed to create FCO for {display}: {e}"), Some(display));
            return;
        }
    };
    new.props = old.props.clone();

    let request = if flags.contains(PolicyUpdateFlags::COMPARE_VALID_PROPS_ONLY) {
        rule.mask.intersection(old.props.valid())
    } else {
        rule.mask.clone()
    };
    let calc_request = if flags.contains(PolicyUpdateFlags::SET_NEW_PROPS) {
        rule.mask.union(&request)
    } else {
        request
    };
    if !calc_request.is_empty() {
        calc.calculate(&mut new, &calc_request, CollidePolicy::Overwrite, CalcFlags::empty(), &mut report.errors);
    }

    if flags.contains(PolicyUpdateFlags::INVALIDATE_EXTRA_DB_PROPS) {
        let extra = old.props.valid().difference(&rule.mask);
        if flags.contains(PolicyUpdateFlags::SECURE) {
            scrub(&mut new.props, &extra);
        }
        new.props.invalidate_vector(&extra);
    }

    let mut changed_props = PropertyVector::new();
    for i in rule.mask.iter() {
        let differs = match (old.props.is_readable(i), new.props.is_readable(i)) {
            (true, true) => old.props.get(i) != new.props.get(i),
            (false, false) => false,
            _ => true,
        };
        if differs {
            changed_props.add_and_grow(i);
        }
    }

    if let Err(e) = db.set_fco_data(name, &new.props) {
        let display = fim_name::to_string_display(name);
        push_error(report, flags, format!("failed to write refreshed properties for {display}: {e}"), Some(display));
        return;
    }

    report.objects_scanned += 1;
    if !changed_props.is_empty() {
        report.changed.push(ChangedEntry { old, new, changed_props });
    }
}

/// A node is kept if some rule of `new_spec` still covers it directly,
/// or if it sits above a rule's start-point and so is path scaffolding
/// for a still-covered subtree.
fn covered_or_scaffolding(new_spec: &SpecList, name: &Name) -> bool {
    new_spec.spec_contains(name) || !new_spec.should_stop_descent(name)
}

/// Prune every database node no rule in `new_spec` covers any more,
/// bottom-up. Unlike the per-rule merge-walk above, this visits the
/// *whole* existing database tree, since an orphaned subtree may not be
/// reachable from any surviving rule's start-point at all.
fn prune_orphans(new_spec: &SpecList, genre: Genre, db: &mut DatabaseIterator, flags: PolicyUpdateFlags, report: &mut Report) {
    if flags.contains(PolicyUpdateFlags::SECURE) {
        db.seek_to(&Name::root(genre));
        scrub_doomed_nodes(new_spec, db, flags, report);
    }
    db.prune_unless(&|name| covered_or_scaffolding(new_spec, name));
}

/// Zero out the stored bytes of every node [`prune_unless`] is about to
/// discard, ahead of the actual removal pass. Read-only with respect to
/// tree shape: only property bytes are overwritten here.
fn scrub_doomed_nodes(new_spec: &SpecList, db: &mut DatabaseIterator, flags: PolicyUpdateFlags, report: &mut Report) {
    if !db.can_descend() {
        return;
    }
    db.descend();
    while !db.done() {
        let Some(name) = db.get_name() else { break };

        scrub_doomed_nodes(new_spec, db, flags, report);

        if !covered_or_scaffolding(new_spec, &name) && db.has_fco_data(&name) {
            scrub_node(&name, db, flags, report);
        }

        db.next();
    }
    db.ascend();
}

fn scrub_node(name: &Name, db: &mut DatabaseIterator, flags: PolicyUpdateFlags, report: &mut Report) {
    match db.create_fco() {
        Ok(fco) => {
            let mut scrubbed = fco.props;
            let all = scrubbed.valid().clone();
            scrub(&mut scrubbed, &all);
            if let Err(e) = db.set_fco_data(name, &scrubbed) {
                let display = fim_name::to_string_display(name);
                push_error(report, flags, format!("failed to scrub {display} before pruning: {e}"), Some(display));
            }
        }
        Err(e) => {
            let display = fim_name::to_string_display(name);
            push_error(report, flags, format!("failed to scrub {display} before pruning: {e}"), Some(display));
        }
    }
}

/// Overwrite every property named by `mask` with a zeroed value of its
/// own kind before it is invalidated or discarded.
fn scrub(props: &mut PropertySet, mask: &PropertyVector) {
    for i in mask.iter() {
        let Some(existing) = props.get(i).cloned() else { continue };
        let zeroed = match existing {
            PropertyValue::Int(_) => PropertyValue::Int(0),
            PropertyValue::Long(_) => PropertyValue::Long(0),
            PropertyValue::FileType(ft) => PropertyValue::FileType(ft),
            PropertyValue::Bytes(b) => PropertyValue::Bytes(vec![0; b.len()]),
            PropertyValue::Str(s) => PropertyValue::Str(" ".repeat(s.len())),
        };
        props.set(i, zeroed);
    }
}
