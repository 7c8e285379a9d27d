//! Partition records by the recipient address of their executor.

use std::borrow::Borrow;
use std::collections::HashMap;

use crate::model::{AssignmentRecord, RecipientId};

/// Records addressed to one recipient, in input order.
#[derive(Debug)]
pub struct RecipientBucket<R> {
    pub recipient: RecipientId,
    pub records: Vec<R>,
}

/// Group records by `executor.recipient`.
///
/// Buckets come back in the order their recipient was first seen.
/// Records whose executor has no recipient are dropped.
pub fn group_by_recipient<R, I>(records: I) -> Vec<RecipientBucket<R>>
where
    R: Borrow<AssignmentRecord>,
    I: IntoIterator<Item = R>,
{
    let mut buckets: Vec<RecipientBucket<R>> = Vec::new();
    let mut index: HashMap<RecipientId, usize> = HashMap::new();

    for record in records {
        let Some(recipient) = record.borrow().executor.recipient.clone() else {
            continue;
        };
        match index.get(&recipient) {
            Some(&i) => buckets[i].records.push(record),
            None => {
                index.insert(recipient.clone(), buckets.len());
                buckets.push(RecipientBucket {
                    recipient,
                    records: vec![record],
                });
            }
        }
    }

    buckets
}
