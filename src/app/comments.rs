use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::store::{CommentStore, PostStore, SharedStore, VoteStore};
use crate::domain::comment::{Comment, CommentNode, NewComment};
use crate::domain::vote::{tally, Vote, VoteTally};

const MAX_COMMENT_LEN: usize = 10_000;

#[derive(Clone)]
pub struct CommentService {
    store: SharedStore,
}

impl CommentService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn create_comment(
        &self,
        author_id: Uuid,
        post_id: Uuid,
        text: String,
        reply_to_id: Option<Uuid>,
    ) -> ServiceResult<Comment> {
        if text.trim().is_empty() {
            return Err(ServiceError::validation("comment text cannot be empty"));
        }
        if text.chars().count() > MAX_COMMENT_LEN {
            return Err(ServiceError::validation(
                "comment text exceeds 10000 characters",
            ));
        }

        if !self.store.post_exists(post_id).await? {
            return Err(ServiceError::NotFound("post"));
        }

        if let Some(parent_id) = reply_to_id {
            let parent = self
                .store
                .find_comment(parent_id)
                .await?
                .ok_or_else(|| ServiceError::validation("reply_to_id does not match a comment"))?;
            if parent.post_id != post_id {
                return Err(ServiceError::validation(
                    "reply_to_id belongs to a different post",
                ));
            }
        }

        let comment = self
            .store
            .create_comment(NewComment {
                post_id,
                author_id,
                text,
                reply_to_id,
            })
            .await?;
        debug!(comment_id = %comment.id, post_id = %post_id, "comment created");

        Ok(comment)
    }

    /// Comment tree for a post, failing with `NotFound` when the post is
    /// missing.
    pub async fn post_thread(
        &self,
        post_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> ServiceResult<Vec<CommentNode>> {
        if !self.store.post_exists(post_id).await? {
            return Err(ServiceError::NotFound("post"));
        }
        self.load_thread(post_id, viewer_id).await
    }

    /// Comment tree for a post already known to exist.
    pub async fn load_thread(
        &self,
        post_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> ServiceResult<Vec<CommentNode>> {
        let comments = self.store.list_comments(post_id).await?;
        if comments.is_empty() {
            return Ok(Vec::new());
        }

        let mut votes_by_comment: HashMap<Uuid, Vec<Vote>> = HashMap::new();
        for vote in self.store.list_post_comment_votes(post_id).await? {
            votes_by_comment.entry(vote.target_id).or_default().push(vote);
        }

        let entries = comments
            .into_iter()
            .map(|comment| {
                let votes = votes_by_comment
                    .get(&comment.id)
                    .map(|votes| tally(votes, viewer_id))
                    .unwrap_or_else(VoteTally::empty);
                (comment, votes)
            })
            .collect();

        Ok(build_thread(entries))
    }
}

/// Arranges comments (oldest first) into reply trees.
///
/// Roots are comments without a parent, plus orphans whose parent is not in
/// the set. Siblings keep their input order. Comments caught in a reply
/// cycle are never reachable from a root; the earliest of them is promoted
/// to a root and the rest hang beneath it. Every comment appears exactly
/// once and the walk is iterative, so depth is not bounded by the stack.
pub fn build_thread(entries: Vec<(Comment, VoteTally)>) -> Vec<CommentNode> {
    let count = entries.len();

    let mut index: HashMap<Uuid, usize> = HashMap::with_capacity(count);
    for (position, (comment, _)) in entries.iter().enumerate() {
        index.entry(comment.id).or_insert(position);
    }

    let mut replies: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut is_root = vec![false; count];
    for (position, (comment, _)) in entries.iter().enumerate() {
        let parent = comment
            .reply_to_id
            .and_then(|parent_id| index.get(&parent_id).copied());
        match parent {
            Some(parent) if parent != position => replies[parent].push(position),
            _ => is_root[position] = true,
        }
    }

    let mut visited = vec![false; count];
    let mut attached: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut walk_order = Vec::with_capacity(count);
    let mut roots = Vec::new();

    for position in 0..count {
        if is_root[position] && !visited[position] {
            roots.push(position);
            walk(position, &replies, &mut visited, &mut attached, &mut walk_order);
        }
    }
    // cycles
    for position in 0..count {
        if !visited[position] {
            roots.push(position);
            walk(position, &replies, &mut visited, &mut attached, &mut walk_order);
        }
    }

    // Parents precede their children in walk_order, so building in reverse
    // always finds the children finished.
    let mut slots: Vec<Option<(Comment, VoteTally)>> = entries.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = (0..count).map(|_| None).collect();
    for &position in walk_order.iter().rev() {
        let Some((comment, votes)) = slots[position].take() else {
            continue;
        };
        let children = attached[position]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[position] = Some(CommentNode {
            comment,
            votes,
            replies: children,
        });
    }

    roots
        .into_iter()
        .filter_map(|root| built[root].take())
        .collect()
}

/// Attaches every not-yet-visited descendant of `root` to its first parent.
fn walk(
    root: usize,
    replies: &[Vec<usize>],
    visited: &mut [bool],
    attached: &mut [Vec<usize>],
    walk_order: &mut Vec<usize>,
) {
    visited[root] = true;
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        walk_order.push(current);
        for &child in &replies[current] {
            if !visited[child] {
                visited[child] = true;
                attached[current].push(child);
                stack.push(child);
            }
        }
    }
}
