use anyhow::Result;

use pathdex::btree::BTree;
use pathdex::btree::Direction;
use pathdex::btree::PathKey;

fn main() -> Result<()> {
    let key = "340282366920938463463374607431768211457".parse::<PathKey>()?;
    let path = "/home/someone/notes.txt";

    // Create a tree with a minimum degree of 3
    let mut tree = BTree::<PathKey>::try_new(3)?;

    // Make sure we can't find our key in the tree
    assert!(!tree.search(&key, path));
    assert_eq!(tree.get(&key), None);

    // Insert our key, bigger than any machine word
    tree.insert(key.clone(), path);

    // Make sure we can find it, but only with the right path
    assert!(tree.search(&key, path));
    assert!(!tree.search(&key, "/home/someone/other.txt"));
    assert_eq!(tree.get(&key), Some(path));

    for k in 0..10u32 {
        tree.insert(PathKey::from(k), format!("/tmp/{k}"));
    }
    tree.print_keys(Direction::Ascending);
    println!("{tree}");

    // Remove it again
    tree.delete(&key, path)?;
    assert!(!tree.search(&key, path));
    assert_eq!(tree.get(&key), None);
    Ok(())
}
