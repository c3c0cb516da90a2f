//! Repository name lookup: `pagesmith repo-name <task>`.

pub fn cmd_repo_name(task: &str) {
    println!("{}", pagesmith::models::repo_name_for_task(task));
}
