pub(crate) mod query_log;

use std::{marker::PhantomData, path::Path};

use anyhow::Result;
use sled::{Db, Tree};

pub(crate) use self::query_log::QueryLogEntry;

const QUERY_TREE: &str = "queries";
const SUBMISSION_TREE: &str = "submissions";

#[derive(Clone)]
pub(crate) struct Database {
    db: Db,
    query_tree: Tree,
    submission_tree: Tree,
}

impl Database {
    fn connect_tree(db: &Db, t_name: &str) -> Result<Tree> {
        Ok(db.open_tree(bincode::serialize(t_name)?)?)
    }

    pub(crate) fn connect(db_path: &Path) -> Result<Database> {
        let db = sled::open(db_path)?;
        let query_tree = Database::connect_tree(&db, QUERY_TREE)?;
        let submission_tree = Database::connect_tree(&db, SUBMISSION_TREE)?;
        Ok(Database {
            db,
            query_tree,
            submission_tree,
        })
    }
}

pub(crate) trait TryFromKeyValue: Sized {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> Result<Self>;
}

/// Decoding iterator over a range of a sled tree.
pub(crate) struct Iter<T> {
    inner: sled::Iter,
    phantom: PhantomData<T>,
}

impl<T> Iter<T> {
    fn new(inner: sled::Iter) -> Self {
        Self {
            inner,
            phantom: PhantomData,
        }
    }
}

impl<T: TryFromKeyValue> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|item| {
            let (key, value) = item?;
            T::try_from_key_value(&key, &value)
        })
    }
}

impl<T: TryFromKeyValue> DoubleEndedIterator for Iter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|item| {
            let (key, value) = item?;
            T::try_from_key_value(&key, &value)
        })
    }
}
