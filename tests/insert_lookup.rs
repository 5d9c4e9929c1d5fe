mod util;

use blocktree::{InsertError, TreeStats};

#[test]
fn single_insert_is_visible_to_lookup() {
    let mut index = util::small_index();
    index.insert(b"bbbb", b"0001").unwrap();
    assert_eq!(index.lookup(b"bbbb").unwrap(), Some(b"0001".to_vec()));
    assert_eq!(index.lookup(b"cccc").unwrap(), None);
}

#[test]
fn first_insert_leaves_the_root_empty() {
    let mut index = util::small_index();
    index.insert(b"bbbb", b"0001").unwrap();
    // One leaf under the root; the root still has zero keys and one pointer.
    assert_eq!(
        index.stats().unwrap(),
        TreeStats {
            height: 2,
            interior_nodes: 1,
            leaf_nodes: 1,
            entries: 1,
            free_blocks: 13,
        }
    );
    assert_eq!(
        util::depth_listing(&mut index),
        "1: interior: *2\n  2: leaf: (bbbb,0001)\n"
    );
}

#[test]
fn inserting_an_existing_key_overwrites_the_value() {
    let mut index = util::small_index();
    index.insert(b"bbbb", b"0001").unwrap();
    index.insert(b"bbbb", b"0002").unwrap();
    assert_eq!(index.lookup(b"bbbb").unwrap(), Some(b"0002".to_vec()));
    assert_eq!(index.stats().unwrap().entries, 1);
}

#[test]
fn key_and_value_lengths_are_enforced() {
    let mut index = util::small_index();
    assert!(matches!(
        index.insert(b"toolong!", b"0001"),
        Err(InsertError::WrongKeyLength {
            expected: 4,
            got: 8
        })
    ));
    assert!(matches!(
        index.insert(b"aaaa", b"x"),
        Err(InsertError::WrongValueLength {
            expected: 4,
            got: 1
        })
    ));
    assert!(matches!(
        index.lookup(b"ab"),
        Err(blocktree::LookupError::WrongKeyLength {
            expected: 4,
            got: 2
        })
    ));
}

#[test]
fn shuffled_inserts_come_back_sorted() {
    let mut index = util::small_index();
    util::insert_all(
        &mut index,
        &[
            (b"gggg", b"GGGG"),
            (b"bbbb", b"BBBB"),
            (b"iiii", b"IIII"),
            (b"aaaa", b"AAAA"),
            (b"ffff", b"FFFF"),
            (b"dddd", b"DDDD"),
            (b"hhhh", b"HHHH"),
            (b"cccc", b"CCCC"),
            (b"eeee", b"EEEE"),
        ],
    );
    assert_eq!(
        util::sorted_listing(&mut index),
        "(aaaa,AAAA)\n(bbbb,BBBB)\n(cccc,CCCC)\n(dddd,DDDD)\n(eeee,EEEE)\n\
         (ffff,FFFF)\n(gggg,GGGG)\n(hhhh,HHHH)\n(iiii,IIII)\n"
    );
    index.sanity_check().unwrap();
    for key in [b"aaaa", b"eeee", b"iiii"] {
        assert!(index.lookup(key).unwrap().is_some());
    }
    assert_eq!(index.lookup(b"jjjj").unwrap(), None);
}
