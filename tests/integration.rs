use std::path::Path;
use std::process::{Command, Output};

fn lessonctl(args: &[&str]) -> Output {
    return Command::new(env!("CARGO_BIN_EXE_lessonctl"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
}

fn stdout(output: &Output) -> String {
    return String::from_utf8_lossy(&output.stdout).into_owned();
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn site(root: &Path) {
    write(
        root,
        "index.html",
        "<html>\n<head><link rel=\"stylesheet\" href=\"style.css\"></head>\n<body>\n\
         <a href=\"L01/index.html\">Lesson 1</a>\n<a href=\"#top\">top</a>\n\
         <a href=\"mailto:prof@uni.edu\">mail</a>\n<a href=\"https://example.com/\">ext</a>\n\
         <div id=\"top\"></div>\n</body>\n</html>\n",
    );
    write(root, "style.css", "body {}");
    write(
        root,
        "L01/index.html",
        "<html>\n<body>\n<img src=\"charts/chart.png\">\n<a href=\"../index.html#top\">home</a>\n\
         <script src=\"quiz.js\"></script>\n</body>\n</html>\n",
    );
    write(root, "L01/charts/chart.png", "png");
    write(root, "L01/quiz.js", "");
}

#[test]
fn clean_site_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());

    let output = lessonctl(&["links", "--base-path", dir.path().to_str().unwrap()]);
    let out = stdout(&output);
    assert_eq!(output.status.code(), Some(0), "{out}");
    assert!(out.contains("Files checked: 2"), "{out}");
    assert!(out.contains("Broken:        0"), "{out}");
    assert!(out.contains("All links valid."), "{out}");
}

#[test]
fn one_broken_link_exits_one_and_is_listed() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    write(dir.path(), "L02/index.html", "<html>\n<body>\n\n<a href=\"../L01/missing.html\">gone</a>\n</body>\n");

    let output = lessonctl(&["links", "--base-path", dir.path().to_str().unwrap()]);
    let out = stdout(&output);
    assert_eq!(output.status.code(), Some(1), "{out}");
    assert!(out.contains("  [BROKEN] ../L01/missing.html\n    Source: L02/index.html:4\n    Error: File not found"), "{out}");
    assert!(out.contains("Broken:        1"), "{out}");
    assert!(!out.contains("[OK]"), "{out}");
}

#[test]
fn verbose_lists_valid_and_skipped_links() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());

    let output = lessonctl(&["links", "--base-path", dir.path().to_str().unwrap(), "--verbose", "--no-color"]);
    let out = stdout(&output);
    assert_eq!(output.status.code(), Some(0), "{out}");
    assert!(out.contains("  [OK] L01/index.html\n"), "{out}");
    assert!(out.contains("  [SKIP] mailto:prof@uni.edu"), "{out}");
    assert!(out.contains("  [SKIP] https://example.com/ (external check disabled)"), "{out}");
}

#[test]
fn json_report_has_every_link() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());

    let output = lessonctl(&["links", "--base-path", dir.path().to_str().unwrap(), "--format", "json"]);
    assert_eq!(output.status.code(), Some(0));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["summary"]["files_checked"], 2);
    assert_eq!(value["summary"]["total_links"], 8);
    assert_eq!(value["summary"]["skipped"], 2);
    assert_eq!(value["files"][0]["file"], "L01/index.html");
}

#[test]
fn bad_base_path_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");

    let output = lessonctl(&["links", "--base-path", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Directory Not Found"));
    assert!(stderr.contains("lessonctl links --base-path <DIR>"), "{stderr}");
}

#[test]
fn malformed_config_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    write(dir.path(), ".lessonctl.toml", "[links]\ndirectory_index = \"index.html\"\n");

    let output = lessonctl(&["links", "--base-path", dir.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid Config"));
}

#[test]
fn directory_links_follow_configured_index() {
    let dir = tempfile::tempdir().unwrap();
    site(dir.path());
    write(dir.path(), "toc.html", "<a href=\"L01/\">Lesson 1</a>");
    let base = dir.path().to_str().unwrap();

    let strict = lessonctl(&["links", "--base-path", base]);
    assert_eq!(strict.status.code(), Some(1));
    assert!(stdout(&strict).contains("Directory reference without index file"));

    let lenient = lessonctl(&["links", "--base-path", base, "--directory-index", "index.html"]);
    assert_eq!(lenient.status.code(), Some(0), "{}", stdout(&lenient));
}

#[test]
fn charts_with_no_scripts_exit_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = lessonctl(&["charts", "--root", dir.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Found 0 chart scripts"));
}

#[test]
fn zero_workers_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = lessonctl(&["charts", "--root", dir.path().to_str().unwrap(), "--parallel", "--workers", "0"]);
    assert_eq!(output.status.code(), Some(2));
}

#[cfg(unix)]
mod charts {
    use super::*;

    const OK: &str = "echo rendering >&2\ntouch chart.pdf chart.png\n";

    /// Eight tasks: six succeed, L07 sleeps past the limit, L08 exits 1.
    fn course(root: &Path) {
        for lesson in 1..=6 {
            write(root, &format!("L0{lesson}/charts/chart.py"), OK);
        }
        write(root, "L07/charts/chart.py", "sleep 30\n");
        write(root, "L08/charts/chart.py", "echo 'ValueError: bad data' >&2\nexit 1\n");
        write(root, "L01/chart.py", "exit 1\n");
    }

    fn run(root: &Path, extra: &[&str]) -> Output {
        let mut args = vec!["charts", "--root", root.to_str().unwrap(), "--interpreter", "sh", "--timeout", "1"];
        args.extend_from_slice(extra);
        return lessonctl(&args);
    }

    #[test]
    fn mixed_batch_reports_every_task() {
        let dir = tempfile::tempdir().unwrap();
        course(dir.path());

        let output = run(dir.path(), &[]);
        let out = stdout(&output);
        assert_eq!(output.status.code(), Some(1), "{out}");
        assert!(out.contains("Found 8 chart scripts"), "{out}");
        assert!(out.contains("Running: L01/charts/chart.py... OK"), "{out}");
        assert!(out.contains("Total: 8, Successful: 6, Failed: 2"), "{out}");
        assert!(out.contains("  L07/charts/chart.py: timeout (timed out after 1s)"), "{out}");
        assert!(out.contains("  L08/charts/chart.py: nonzero_exit (exit status: 1)"), "{out}");
        assert!(out.contains("ValueError: bad data"), "{out}");
        let failure_list = out.split("Failed charts:").nth(1).unwrap();
        assert_eq!(failure_list.matches("chart.py:").count(), 2, "{out}");
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let dir = tempfile::tempdir().unwrap();
        course(dir.path());

        let statuses = |output: &Output| -> Vec<(String, String)> {
            let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
            let mut statuses: Vec<(String, String)> = value["tasks"]
                .as_array()
                .unwrap()
                .iter()
                .map(|t| return (t["script"].as_str().unwrap().to_string(), t["reason"].as_str().unwrap().to_string()))
                .collect();
            statuses.sort();
            return statuses;
        };

        let sequential = run(dir.path(), &["--format", "json"]);
        let parallel = run(dir.path(), &["--format", "json", "--parallel", "--workers", "4"]);
        assert_eq!(sequential.status.code(), Some(1));
        assert_eq!(parallel.status.code(), Some(1));
        assert_eq!(statuses(&sequential), statuses(&parallel));
    }

    #[test]
    fn silent_script_fails_artifact_check() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "L01/charts/chart.py", "touch chart.pdf\n");

        let output = run(dir.path(), &[]);
        let out = stdout(&output);
        assert_eq!(output.status.code(), Some(1), "{out}");
        assert!(out.contains("L01/charts/chart.py: missing_artifact (missing chart.png)"), "{out}");
    }

    #[test]
    fn dry_run_lists_without_running() {
        let dir = tempfile::tempdir().unwrap();
        course(dir.path());

        let output = run(dir.path(), &["--dry-run"]);
        let out = stdout(&output);
        assert_eq!(output.status.code(), Some(0), "{out}");
        assert!(out.contains("  L08/charts/chart.py"), "{out}");
        assert!(!dir.path().join("L01/charts/chart.png").exists());
    }
}
