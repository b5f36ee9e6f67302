//! Integration coverage for the quote/antiform ladder (spec §3, §9): meta and
//! unmeta are inverses, and quoting/unquoting is a plain depth counter
//! orthogonal to antiform state.

use rebcore::Cell;

#[test]
fn meta_then_unmeta_restores_antiform() {
    let mut cell = Cell::logic(true).into_antiform();
    assert!(cell.is_antiform());
    cell.meta();
    assert!(!cell.is_antiform());
    assert_eq!(cell.quote_depth(), 1);
    cell.unmeta();
    assert!(cell.is_antiform());
    assert_eq!(cell.quote_depth(), 0);
}

#[test]
fn meta_on_plain_value_just_increments_quote_depth() {
    let mut cell = Cell::integer(42);
    cell.meta();
    assert_eq!(cell.quote_depth(), 1);
    assert!(!cell.is_antiform());
    cell.meta();
    assert_eq!(cell.quote_depth(), 2);
}

#[test]
fn repeated_quote_and_unquote_round_trips() {
    let mut cell = Cell::integer(7);
    for _ in 0..3 {
        cell.quote_one();
    }
    assert_eq!(cell.quote_depth(), 3);
    for _ in 0..3 {
        cell.unquote_one();
    }
    assert_eq!(cell.quote_depth(), 0);
    assert!(cell.is_plain());
}

#[test]
fn plain_is_the_only_legal_in_array_state() {
    let plain = Cell::integer(1);
    assert!(plain.is_plain());
    let mut quoted = plain.clone_value();
    quoted.quote_one();
    assert!(!quoted.is_plain());
    let antiform = Cell::logic(false).into_antiform();
    assert!(!antiform.is_plain());
}
