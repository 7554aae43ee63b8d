//! The merge-walk primitive: a sorted-merge comparison of two
//! [`DataSourceIterator`]s over a shared parent's children (spec.md §4.9).
//!
//! Both cursors must already be positioned on the same name when the
//! walk begins; `merge_walk` descends into its children, visits them in
//! short-name order, and ascends back to the starting position before
//! returning.

use fim_datasource::DataSourceIterator;
use fim_name::Name;

/// Recursively diff the children of `db`/`fs`'s current position.
///
/// `should_stop_descent(name)` gates recursion below a `Changed` entry
/// and below the root of an `Added`/`Removed` subtree, mirroring a
/// rule's stop-point/max-depth policy. The three callbacks receive the
/// iterator(s) relevant to the event; for `Changed` both cursors are
/// positioned on the same name.
#[allow(clippy::too_many_arguments)]
pub fn merge_walk<DB, FS>(
    db: &mut DB,
    fs: &mut FS,
    should_stop_descent: &mut dyn FnMut(&Name) -> bool,
    on_added: &mut dyn FnMut(&Name, &mut FS),
    on_removed: &mut dyn FnMut(&Name, &mut DB),
    on_changed: &mut dyn FnMut(&Name, &mut DB, &mut FS),
) where
    DB: DataSourceIterator,
    FS: DataSourceIterator,
{
    db.descend();
    fs.descend();

    loop {
        match (db.done(), fs.done()) {
            (true, true) => break,
            (true, false) => {
                walk_added(fs, should_stop_descent, on_added);
                fs.next();
            }
            (false, true) => {
                walk_removed(db, should_stop_descent, on_removed);
                db.next();
            }
            (false, false) => {
                let db_name = db.get_name().expect("db not done");
                let fs_name = fs.get_name().expect("fs not done");
                match db_name.compare_short_name(&fs_name) {
                    std::cmp::Ordering::Less => {
                        walk_removed(db, should_stop_descent, on_removed);
                        db.next();
                    }
                    std::cmp::Ordering::Greater => {
                        walk_added(fs, should_stop_descent, on_added);
                        fs.next();
                    }
                    std::cmp::Ordering::Equal => {
                        on_changed(&fs_name, db, fs);
                        if !should_stop_descent(&fs_name) && db.can_descend() && fs.can_descend() {
                            merge_walk(db, fs, should_stop_descent, on_added, on_removed, on_changed);
                        }
                        db.next();
                        fs.next();
                    }
                }
            }
        }
    }

    db.ascend();
    fs.ascend();
}

fn walk_added<FS: DataSourceIterator>(
    fs: &mut FS,
    should_stop_descent: &mut dyn FnMut(&Name) -> bool,
    on_added: &mut dyn FnMut(&Name, &mut FS),
) {
    let Some(name) = fs.get_name() else { return };
    on_added(&name, fs);
    if !should_stop_descent(&name) && fs.can_descend() {
        fs.descend();
        while !fs.done() {
            walk_added(fs, should_stop_descent, on_added);
            fs.next();
        }
        fs.ascend();
    }
}

fn walk_removed<DB: DataSourceIterator>(
    db: &mut DB,
    should_stop_descent: &mut dyn FnMut(&Name) -> bool,
    on_removed: &mut dyn FnMut(&Name, &mut DB),
) {
    let Some(name) = db.get_name() else { return };
    on_removed(&name, db);
    if !should_stop_descent(&name) && db.can_descend() {
        db.descend();
        while !db.done() {
            walk_removed(db, should_stop_descent, on_removed);
            db.next();
        }
        db.ascend();
    }
}
