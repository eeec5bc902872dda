#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

/// Single edit/delete policy for comments, shared by every route that
/// moderates them: admins always pass, authors pass on their own comments,
/// and teachers pass on comments under a course they teach. Pure predicate;
/// persistence checks (soft-delete freeze, reply guard) live with the caller.
pub fn can_modify(actor: &Actor, comment_author_id: &str, course_teacher_id: &str) -> bool {
    match actor.role {
        Role::Admin => true,
        _ if actor.id == comment_author_id => true,
        Role::Teacher => actor.id == course_teacher_id,
        Role::Student => false,
    }
}

/// Delete-only guard: a non-admin may not delete a comment that still has
/// non-deleted direct replies. Admins bypass the count entirely.
pub fn delete_blocked_by_replies(actor: &Actor, live_reply_count: i64) -> bool {
    actor.role != Role::Admin && live_reply_count > 0
}
