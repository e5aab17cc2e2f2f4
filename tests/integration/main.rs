//! Integration tests for Crosby

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn crosby() -> Command {
        let mut cmd = cargo_bin_cmd!("crosby");
        cmd.env("CI", "true").env_remove("CROSBY_CONFIG");
        cmd
    }

    /// Config using a local cache under `cache` with telemetry off
    fn write_config(dir: &Path, cache: &Path) -> std::path::PathBuf {
        let path = dir.join("config.toml");
        let content = format!(
            "[general]\ntelemetry = false\n\n[backend]\nkind = \"local\"\npath = {:?}\n",
            cache.display().to_string()
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        crosby()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build cache"));
    }

    #[test]
    fn version_displays() {
        crosby()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("crosby"));
    }

    #[test]
    fn no_command_prints_usage() {
        crosby()
            .assert()
            .success()
            .stdout(predicate::str::contains("Must Specify Command to Run"))
            .stdout(predicate::str::contains("Usage: crosby <command>"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let home = TempDir::new().unwrap();
        let config = home.path().join("config.toml");
        std::fs::write(&config, "[backend]\nkind = \"floppy\"\n").unwrap();

        crosby()
            .args(["--config", config.to_str().unwrap(), "true"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn miss_then_hit_on_another_checkout() {
        let home = TempDir::new().unwrap();
        let cache = home.path().join("cache");
        let config = write_config(home.path(), &cache);
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        for dir in [&first, &second] {
            std::fs::write(dir.path().join("main.c"), "int main() { return 0; }").unwrap();
        }
        let build = ["sh", "-c", "cat main.c > app"];

        crosby()
            .arg("--config")
            .arg(&config)
            .arg("-C")
            .arg(first.path())
            .args(build)
            .assert()
            .success()
            .stdout(predicate::str::contains("[MISS]"));
        assert!(cache.join("index.jsonl").exists());

        crosby()
            .arg("--config")
            .arg(&config)
            .arg("-C")
            .arg(second.path())
            .args(build)
            .assert()
            .success()
            .stdout(predicate::str::contains("[HIT]"));
        assert_eq!(
            std::fs::read_to_string(second.path().join("app")).unwrap(),
            "int main() { return 0; }"
        );
    }

    #[test]
    fn failing_command_is_reported() {
        let home = TempDir::new().unwrap();
        let config = write_config(home.path(), &home.path().join("cache"));
        let project = TempDir::new().unwrap();

        crosby()
            .arg("--config")
            .arg(&config)
            .arg("-C")
            .arg(project.path())
            .args(["sh", "-c", "echo compile error >&2; exit 1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("compile error"))
            .stderr(predicate::str::contains("nothing was cached"));
    }
}

mod scenario_tests {
    use crosby::cache::{CacheClient, CacheIndex, LocalStore, MemoryStore};
    use crosby::controller::{Controller, Outcome, UploadPlan};
    use crosby::error::CrosbyError;
    use crosby::fingerprint::Fingerprint;
    use crosby::retry::RetryPolicy;
    use crosby::ui::UiContext;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const PLATFORM: &str = "linux-amd64";

    fn plan() -> UploadPlan {
        UploadPlan {
            retry: RetryPolicy {
                max_attempts: 4,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
            },
            concurrency: 2,
        }
    }

    fn controller(client: CacheClient, root: &Path) -> Controller {
        Controller::new(client, root, PLATFORM, plan(), UiContext::non_interactive())
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    fn checkout(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let path = dir.path().join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    fn sources() -> TempDir {
        checkout(&[("main.c", "int main() {}"), ("util.c", "int util() {}")])
    }

    #[tokio::test]
    async fn build_once_restore_elsewhere() {
        let store = Arc::new(MemoryStore::new());
        let runs = TempDir::new().unwrap();
        let marker = runs.path().join("runs");
        let build = sh(&format!(
            "cat main.c util.c > app && echo ran >> {}",
            marker.display()
        ));

        let first = sources();
        let outcome = controller(CacheClient::shared(store.clone()), first.path())
            .run(&build)
            .await
            .unwrap();
        let Outcome::Cached(result) = outcome else {
            panic!("expected a miss");
        };
        assert_eq!(result.blob_ids.len(), 1);
        assert_eq!(result.fingerprint.platform, PLATFORM);
        assert_eq!(result.fingerprint.files.len(), 2);
        assert_eq!(store.result_sets().await.len(), 1);

        let second = sources();
        let outcome = controller(CacheClient::shared(store.clone()), second.path())
            .run(&build)
            .await
            .unwrap();
        let Outcome::Restored(report) = outcome else {
            panic!("expected a hit");
        };
        assert_eq!(report.result_id, result.id);
        assert!(report.is_complete());

        let app = second.path().join("app");
        assert_eq!(
            std::fs::read_to_string(&app).unwrap(),
            "int main() {}int util() {}"
        );
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&app).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
        // The command ran exactly once
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "ran\n");
    }

    #[tokio::test]
    async fn fingerprint_is_deterministic() {
        let a = sources();
        let b = sources();
        let args = sh("make");

        let fa = Fingerprint::compute(a.path(), &args, PLATFORM).unwrap();
        let fb = Fingerprint::compute(b.path(), &args, PLATFORM).unwrap();
        assert!(fa.matches(&fb));
        assert_eq!(
            Fingerprint::compute(a.path(), &args, PLATFORM).unwrap(),
            fa
        );
    }

    #[tokio::test]
    async fn only_exact_matches_hit() {
        let store = Arc::new(MemoryStore::new());
        let build = sh("cat main.c > app");
        controller(CacheClient::shared(store.clone()), sources().path())
            .run(&build)
            .await
            .unwrap();

        // One changed byte
        let edited = checkout(&[("main.c", "int main() {} "), ("util.c", "int util() {}")]);
        let outcome = controller(CacheClient::shared(store.clone()), edited.path())
            .run(&build)
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Cached(_)));

        // A superset of the cached inputs
        let extra = checkout(&[
            ("main.c", "int main() {}"),
            ("util.c", "int util() {}"),
            ("extra.h", "#pragma once"),
        ]);
        let outcome = controller(CacheClient::shared(store.clone()), extra.path())
            .run(&build)
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Cached(_)));

        // Different arguments
        let outcome = controller(CacheClient::shared(store.clone()), sources().path())
            .run(&sh("cat util.c > app"))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Cached(_)));

        assert_eq!(store.result_sets().await.len(), 4);
    }

    #[tokio::test]
    async fn command_without_outputs_is_no_changes() {
        let store = Arc::new(MemoryStore::new());
        let check = sh("test -f main.c");

        let first = controller(CacheClient::shared(store.clone()), sources().path())
            .run(&check)
            .await
            .unwrap();
        let Outcome::Cached(result) = first else {
            panic!("expected a miss");
        };
        assert!(result.blob_ids.is_empty());

        let second = controller(CacheClient::shared(store.clone()), sources().path())
            .run(&check)
            .await
            .unwrap();
        assert!(matches!(second, Outcome::NoChanges { result_id } if result_id == result.id));
    }

    #[tokio::test]
    async fn rewritten_inputs_are_outputs() {
        let store = Arc::new(MemoryStore::new());
        let dir = sources();

        let outcome = controller(CacheClient::shared(store.clone()), dir.path())
            .run(&sh("echo '// formatted' >> main.c"))
            .await
            .unwrap();
        let Outcome::Cached(result) = outcome else {
            panic!("expected a miss");
        };
        assert_eq!(result.blob_ids.len(), 1);
    }

    #[tokio::test]
    async fn one_failed_file_does_not_stop_the_others() {
        let store = Arc::new(MemoryStore::new());
        let build = sh("echo a > a.out && echo b > b.out && echo c > c.out");
        controller(CacheClient::shared(store.clone()), sources().path())
            .run(&build)
            .await
            .unwrap();

        let target = sources();
        std::fs::create_dir(target.path().join("b.out")).unwrap();
        let outcome = controller(CacheClient::shared(store.clone()), target.path())
            .run(&build)
            .await
            .unwrap();
        let Outcome::Restored(report) = outcome else {
            panic!("expected a hit");
        };

        assert_eq!(report.files.len(), 3);
        assert_eq!(report.restored_count(), 2);
        let failed: Vec<_> = report.failures().map(|f| f.path.as_str()).collect();
        assert_eq!(failed, vec!["b.out"]);
        assert_eq!(
            std::fs::read_to_string(target.path().join("a.out")).unwrap(),
            "a\n"
        );
        assert_eq!(
            std::fs::read_to_string(target.path().join("c.out")).unwrap(),
            "c\n"
        );
    }

    #[tokio::test]
    async fn retried_uploads_are_not_duplicated() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_puts(2);

        let outcome = controller(CacheClient::shared(store.clone()), sources().path())
            .run(&sh("echo 1 > one.o && echo 2 > two.o"))
            .await
            .unwrap();
        let Outcome::Cached(result) = outcome else {
            panic!("expected a miss");
        };

        assert_eq!(result.blob_ids.len(), 2);
        assert_eq!(store.blob_count().await, 2);
        assert_eq!(store.put_calls(), 4);
        let stored = store.result_sets().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].blob_ids, result.blob_ids);
    }

    #[tokio::test]
    async fn exhausted_uploads_insert_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_puts(100);
        let dir = sources();

        let err = controller(CacheClient::shared(store.clone()), dir.path())
            .run(&sh("echo 1 > one.o"))
            .await
            .unwrap_err();
        assert!(matches!(err, CrosbyError::BlobUpload { attempts: 4, .. }));
        assert!(store.result_sets().await.is_empty());
        assert!(dir.path().join("one.o").exists());
    }

    #[tokio::test]
    async fn failed_insert_keeps_outputs() {
        let store = Arc::new(MemoryStore::new());
        store.set_reject_inserts(true);
        let dir = sources();

        let err = controller(CacheClient::shared(store.clone()), dir.path())
            .run(&sh("echo built > app"))
            .await
            .unwrap_err();
        assert!(matches!(err, CrosbyError::ResultInsert(_)));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app")).unwrap(),
            "built\n"
        );
    }

    #[tokio::test]
    async fn unreachable_cache_runs_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let dir = sources();

        let err = controller(CacheClient::shared(store.clone()), dir.path())
            .run(&sh("echo built > app"))
            .await
            .unwrap_err();
        assert!(matches!(err, CrosbyError::Connectivity(_)));
        assert!(err.hint().is_some());
        assert!(!dir.path().join("app").exists());
    }

    #[tokio::test]
    async fn local_backend_round_trip() {
        let cache = TempDir::new().unwrap();
        let build = sh("mkdir -p bin && cat main.c > bin/app");

        let first = sources();
        let outcome = controller(
            CacheClient::shared(Arc::new(LocalStore::new(cache.path()))),
            first.path(),
        )
        .run(&build)
        .await
        .unwrap();
        assert!(matches!(outcome, Outcome::Cached(_)));

        // A fresh handle sees what the first one wrote
        let store = Arc::new(LocalStore::new(cache.path()));
        let second = sources();
        let query = Fingerprint::compute(second.path(), &build, PLATFORM).unwrap();
        assert_eq!(store.find(&query).await.unwrap().len(), 1);

        let outcome = controller(CacheClient::shared(store), second.path())
            .run(&build)
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Restored(ref r) if r.is_complete()));
        assert_eq!(
            std::fs::read_to_string(second.path().join("bin/app")).unwrap(),
            "int main() {}"
        );
    }
}
