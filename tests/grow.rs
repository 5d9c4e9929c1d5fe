mod util;

use blocktree::TreeStats;

fn keys() -> Vec<(Vec<u8>, Vec<u8>)> {
    (b'a'..=b'j')
        .map(|letter| {
            (
                vec![letter; 4],
                vec![letter.to_ascii_uppercase(); 4],
            )
        })
        .collect()
}

#[test]
fn eighth_insert_splits_the_root_and_grows_the_tree() {
    let mut index = util::small_index();
    let keys = keys();

    for (key, value) in &keys[..7] {
        index.insert(key, value).unwrap();
    }
    assert_eq!(index.stats().unwrap().height, 2);

    index.insert(&keys[7].0, &keys[7].1).unwrap();
    assert_eq!(index.stats().unwrap().height, 3);
    index.sanity_check().unwrap();
}

#[test]
fn three_level_tree_shape_after_ten_ascending_inserts() {
    let mut index = util::small_index();
    for (key, value) in &keys() {
        index.insert(key, value).unwrap();
    }

    assert_eq!(
        util::depth_listing(&mut index),
        "7: interior: *1 eeee *6\n\
         \x20 1: interior: *2 cccc *3\n\
         \x20   2: leaf: (aaaa,AAAA) (bbbb,BBBB)\n\
         \x20   3: leaf: (cccc,CCCC) (dddd,DDDD)\n\
         \x20 6: interior: *4 gggg *5 iiii *8\n\
         \x20   4: leaf: (eeee,EEEE) (ffff,FFFF)\n\
         \x20   5: leaf: (gggg,GGGG) (hhhh,HHHH)\n\
         \x20   8: leaf: (iiii,IIII) (jjjj,JJJJ)\n"
    );
    assert_eq!(
        index.stats().unwrap(),
        TreeStats {
            height: 3,
            interior_nodes: 3,
            leaf_nodes: 5,
            entries: 10,
            free_blocks: 7,
        }
    );
    index.sanity_check().unwrap();

    for (key, value) in &keys() {
        assert_eq!(index.lookup(key).unwrap(), Some(value.clone()));
    }
    assert_eq!(index.lookup(b"zzzz").unwrap(), None);
}

#[test]
fn every_key_stays_reachable_through_descending_inserts() {
    let mut index = util::small_index();
    let mut keys = keys();
    keys.reverse();
    for (key, value) in &keys {
        index.insert(key, value).unwrap();
    }
    index.sanity_check().unwrap();
    for (key, value) in &keys {
        assert_eq!(index.lookup(key).unwrap(), Some(value.clone()));
    }
    assert_eq!(index.stats().unwrap().entries, 10);
}
