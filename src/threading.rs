use serde::Serialize;
use std::collections::HashMap;

/// One flat comment row as fetched for a course, ascending by creation time.
#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub course_id: String,
    pub user_id: String,
    pub author_name: String,
    pub author_role: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub is_edited: bool,
    pub edited_at: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    pub id: String,
    pub course_id: String,
    pub user_id: String,
    pub author_name: String,
    pub author_role: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub is_edited: bool,
    pub edited_at: Option<String>,
    pub deleted: bool,
    pub created_at: String,
    pub replies: Vec<CommentNode>,
}

/// Builds the reply forest for a course from its full flat row set.
///
/// Two linear passes over an arena indexed by comment id: the first maps ids
/// to positions, the second attaches each row to its parent's child list or
/// to the root list. Because the input is ascending by `created_at` and both
/// passes keep encounter order, every `replies` list and the root list come
/// out oldest-first.
///
/// A row whose `parent_id` does not resolve within the given set (cross-course
/// corruption, or a self-reference) is dropped: neither promoted to root nor
/// an error.
pub fn build_tree(rows: &[CommentRow]) -> Vec<CommentNode> {
    let index: HashMap<&str, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.as_str(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    let mut roots: Vec<usize> = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        match row.parent_id.as_deref() {
            None => roots.push(i),
            Some(parent) => match index.get(parent) {
                Some(&p) if p != i => children[p].push(i),
                _ => {}
            },
        }
    }

    roots.iter().map(|&i| assemble(i, rows, &children)).collect()
}

fn assemble(i: usize, rows: &[CommentRow], children: &[Vec<usize>]) -> CommentNode {
    let row = &rows[i];
    CommentNode {
        id: row.id.clone(),
        course_id: row.course_id.clone(),
        user_id: row.user_id.clone(),
        author_name: row.author_name.clone(),
        author_role: row.author_role.clone(),
        parent_id: row.parent_id.clone(),
        // Content of a soft-deleted comment is withheld; the client renders
        // its own placeholder.
        content: if row.deleted_at.is_some() {
            String::new()
        } else {
            row.content.clone()
        },
        is_edited: row.is_edited,
        edited_at: row.edited_at.clone(),
        deleted: row.deleted_at.is_some(),
        created_at: row.created_at.clone(),
        replies: children[i]
            .iter()
            .map(|&c| assemble(c, rows, children))
            .collect(),
    }
}
