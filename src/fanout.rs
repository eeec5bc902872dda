/// Who a newly created comment notifies.
///
/// - A reply notifies the parent comment's author.
/// - A root comment notifies every enrolled student plus the course teacher.
///
/// The acting user is never in the result, so a self-reply yields nothing.
/// Delivery itself is the caller's problem and is best-effort: a failed
/// notification write must never fail the comment insert.
pub enum NewComment<'a> {
    Reply { parent_author_id: &'a str },
    Root {
        teacher_id: &'a str,
        enrolled_student_ids: &'a [String],
    },
}

pub fn recipients(actor_id: &str, comment: NewComment<'_>) -> Vec<String> {
    let mut out = Vec::new();
    match comment {
        NewComment::Reply { parent_author_id } => {
            if parent_author_id != actor_id {
                out.push(parent_author_id.to_string());
            }
        }
        NewComment::Root {
            teacher_id,
            enrolled_student_ids,
        } => {
            for student in enrolled_student_ids {
                if student != actor_id && !out.contains(student) {
                    out.push(student.clone());
                }
            }
            if teacher_id != actor_id && !out.iter().any(|id| id == teacher_id) {
                out.push(teacher_id.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reply_notifies_parent_author() {
        assert_eq!(
            recipients("s2", NewComment::Reply { parent_author_id: "s1" }),
            ids(&["s1"])
        );
    }

    #[test]
    fn self_reply_notifies_nobody() {
        assert!(recipients("s1", NewComment::Reply { parent_author_id: "s1" }).is_empty());
    }

    #[test]
    fn root_comment_notifies_classmates_and_teacher() {
        let students = ids(&["s1", "s2", "s3"]);
        assert_eq!(
            recipients(
                "s1",
                NewComment::Root {
                    teacher_id: "t1",
                    enrolled_student_ids: &students,
                }
            ),
            ids(&["s2", "s3", "t1"])
        );
    }

    #[test]
    fn teacher_root_comment_excludes_the_teacher() {
        let students = ids(&["s1", "s2"]);
        assert_eq!(
            recipients(
                "t1",
                NewComment::Root {
                    teacher_id: "t1",
                    enrolled_student_ids: &students,
                }
            ),
            ids(&["s1", "s2"])
        );
    }
}
