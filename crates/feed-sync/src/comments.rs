use tracing::debug;

use feed_crypto::AddressDeriver;
use feed_ledger::Ledger;
use feed_types::{Account, CommentEntry};

use crate::error::{SyncError, SyncResult};
use crate::view::sort_comments;

/// Fetch every comment of one post, oldest first.
///
/// Reads the post for its comment counter, derives the address of each
/// index below it and fetches them in one batch. Indices that come back
/// empty (a replica that has not caught up yet) are skipped.
pub async fn fetch_comments(
    ledger: &dyn Ledger,
    deriver: &AddressDeriver,
    post_index: u64,
) -> SyncResult<Vec<CommentEntry>> {
    let post = deriver.post(post_index)?;
    let comment_count = match ledger
        .fetch_account(&post.address)
        .await
        .map_err(SyncError::FetchFailed)?
    {
        Some(Account::Post(post)) => post.comment_count,
        _ => return Err(SyncError::PostMissing { index: post_index }),
    };

    let addresses = (0..comment_count)
        .map(|i| deriver.comment(post_index, i).map(|d| d.address))
        .collect::<Result<Vec<_>, _>>()?;
    let fetched = ledger
        .fetch_multiple(&addresses)
        .await
        .map_err(SyncError::FetchFailed)?;

    let mut comments: Vec<CommentEntry> = addresses
        .into_iter()
        .zip(fetched)
        .filter_map(|(address, account)| match account {
            Some(Account::Comment(comment)) => Some(CommentEntry { address, comment }),
            _ => None,
        })
        .collect();
    sort_comments(&mut comments);

    debug!(post_index, comment_count, fetched = comments.len(), "comments fetched");
    Ok(comments)
}
