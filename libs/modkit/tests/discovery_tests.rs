//! End-to-end tests: packages on disk through scan, cache and state.

use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;

use modkit::{
    CacheStore, DisabledList, ManagerOptions, ModuleManager, NoConfig, RegistryError,
};

struct App {
    root: TempDir,
}

impl App {
    /// `modules/pkg-a` is `blog`, `modules/pkg-b` is `shop` requiring pkg-a.
    /// The root package is the system module `app`.
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let app = App { root };
        app.package(
            ".",
            json!({
                "name": "acme/app",
                "description": "Host application",
                "require": {"acme/shop": "*"},
                "autoload": {"psr-4": {"App\\": "app/"}},
                "extra": {"module": {}}
            }),
        );
        app.package(
            "modules/pkg-b",
            json!({
                "name": "acme/shop",
                "description": "Shop",
                "require": {"acme/blog": "^1.0"},
                "autoload": {"psr-4": {"Acme\\Shop\\": "src/"}},
                "extra": {"module": {
                    "name": "shop",
                    "providers": ["Acme\\Shop\\ShopServiceProvider"]
                }}
            }),
        );
        app.package(
            "modules/pkg-a",
            json!({
                "name": "acme/blog",
                "description": "Blog",
                "autoload": {"psr-4": {"Acme\\Blog\\": "src/"}},
                "extra": {"module": {
                    "name": "blog",
                    "providers": [
                        "Acme\\Blog\\BlogServiceProvider",
                        {"class": "Acme\\Blog\\FeedProvider", "deferred": true, "provides": ["blog.feed"]}
                    ],
                    "aliases": {"Blog": "Acme\\Blog\\Facades\\Blog"}
                }}
            }),
        );
        app
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    fn package(&self, rel: &str, manifest: serde_json::Value) {
        let dir = self.path(rel);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("composer.json"),
            serde_json::to_vec_pretty(&manifest).unwrap(),
        )
        .unwrap();
    }

    fn options(&self) -> ManagerOptions {
        ManagerOptions::new(self.root.path())
    }

    fn boot(&self) -> ModuleManager {
        ModuleManager::boot(self.options()).unwrap()
    }
}

fn canonical(p: &Path) -> PathBuf {
    std::fs::canonicalize(p).unwrap()
}

#[test]
fn discovers_orders_and_resolves() {
    let app = App::new();
    let manager = app.boot();
    let registry = manager.registry();

    assert_eq!(registry.modules().names(), vec!["blog", "shop", "app"]);
    assert_eq!(
        registry.by_namespace("Acme\\Blog\\Post").unwrap().name,
        "blog"
    );
    assert_eq!(
        registry.get("shop").unwrap().path,
        canonical(&app.path("modules/pkg-b"))
    );
    assert_eq!(
        registry
            .by_path(canonical(&app.path("modules/pkg-a")).join("src/Post.php"))
            .unwrap()
            .name,
        "blog"
    );
    assert!(registry.get("app").unwrap().system);
    assert_eq!(registry.get("shop").unwrap().dependencies, vec!["blog"]);
}

#[test]
fn cache_round_trip_preserves_modules() {
    let app = App::new();
    let first = app.boot().registry();

    let cache = CacheStore::new(app.path("bootstrap/cache/modules.json"));
    assert!(cache.load().unwrap().is_some());

    let restored = app.boot().registry();
    assert_eq!(restored.modules().names(), first.modules().names());
    for (name, module) in first.modules().iter() {
        let other = restored.get(name).unwrap();
        assert_eq!(other.namespace, module.namespace);
        assert_eq!(other.path, module.path);
        assert_eq!(other.providers, module.providers);
        assert_eq!(other.deferred, module.deferred);
        assert_eq!(other.aliases, module.aliases);
        assert_eq!(other.enabled, module.enabled);
    }
}

#[test]
fn cache_is_used_even_when_packages_change() {
    let app = App::new();
    app.boot();

    app.package(
        "modules/pkg-c",
        json!({"name": "acme/late", "autoload": {"psr-4": {"Acme\\Late\\": "src/"}}, "extra": {"module": {}}}),
    );
    let manager = app.boot();
    assert!(!manager.registry().has("late"));

    manager.scan(true).unwrap();
    assert!(manager.registry().has("late"));
    assert!(app.boot().registry().has("late"));
}

#[test]
fn corrupt_cache_triggers_rescan() {
    let app = App::new();
    let cache = app.path("bootstrap/cache/modules.json");
    std::fs::create_dir_all(cache.parent().unwrap()).unwrap();
    std::fs::write(&cache, "{{{ definitely not json").unwrap();

    let manager = app.boot();
    assert_eq!(manager.registry().modules().count(), 3);

    let rewritten = CacheStore::new(&cache).load().unwrap().unwrap();
    assert_eq!(rewritten.modules.len(), 3);
}

#[test]
fn disable_survives_restart_and_is_idempotent() {
    let app = App::new();
    let manager = app.boot();

    assert!(manager.disable("blog").unwrap());
    assert!(!manager.is_enabled("blog"));

    let list = app.path("storage/modules.disabled");
    let bytes = std::fs::read(&list).unwrap();
    assert!(!manager.disable("blog").unwrap());
    assert_eq!(std::fs::read(&list).unwrap(), bytes);

    let restarted = app.boot();
    assert!(!restarted.is_enabled("blog"));
    assert!(DisabledList::load(&list).unwrap().is_disabled("blog"));

    assert!(restarted.enable("blog").unwrap());
    assert!(app.boot().is_enabled("blog"));
}

#[test]
fn system_module_cannot_be_disabled() {
    let app = App::new();
    let manager = app.boot();

    let err = manager.disable("app").unwrap_err();
    assert!(matches!(err, RegistryError::CannotDisableSystemModule(_)));
    assert!(!app.path("storage/modules.disabled").exists());
    assert!(manager.is_enabled("app"));
}

#[test]
fn stale_module_is_force_disabled() {
    let app = App::new();
    app.boot();

    std::fs::remove_file(app.path("modules/pkg-b/composer.json")).unwrap();
    let manager = app.boot();
    let registry = manager.registry();

    assert!(registry.has("shop"));
    assert!(!registry.is_enabled("shop"));
    assert!(registry.is_enabled("blog"));
}

#[test]
fn rescan_is_idempotent_and_keeps_flags() {
    let app = App::new();
    let manager = app.boot();
    manager.disable("shop").unwrap();
    let before = manager.registry();

    let summary = manager.scan(true).unwrap();
    assert!(summary.errors.is_empty());
    assert_eq!(summary.modules, 3);
    assert_eq!(summary.enabled, 2);

    let after = manager.registry();
    assert_eq!(after.modules().names(), before.modules().names());
    for (name, module) in before.modules().iter() {
        let other = after.get(name).unwrap();
        assert_eq!(other.namespace, module.namespace);
        assert_eq!(other.path, module.path);
        assert_eq!(other.enabled, module.enabled);
    }
}

#[test]
fn concurrent_scan_never_hides_a_disable() {
    let app = App::new();
    let manager = app.boot();
    let list = app.path("storage/modules.disabled");

    for round in 0..200 {
        manager.enable("blog").unwrap();
        std::thread::scope(|s| {
            s.spawn(|| manager.scan(false).unwrap());
            s.spawn(|| manager.disable("blog").unwrap());
        });
        assert!(DisabledList::load(&list).unwrap().is_disabled("blog"));
        assert!(
            !manager.is_enabled("blog"),
            "round {round}: snapshot enabled after disable"
        );
    }
}

#[test]
fn rescan_picks_up_state_changed_by_another_process() {
    let app = App::new();
    let first = app.boot();
    let second = app.boot();

    second.disable("shop").unwrap();
    assert!(first.is_enabled("shop"));

    first.scan(false).unwrap();
    assert!(!first.is_enabled("shop"));

    second.enable("shop").unwrap();
    first.scan(false).unwrap();
    assert!(first.is_enabled("shop"));
}

#[test]
fn registration_plan_covers_enabled_modules() {
    let app = App::new();
    let manager = app.boot();
    manager.disable("shop").unwrap();

    let plan = manager.registration_plan(None, &NoConfig).unwrap();
    let names: Vec<_> = plan.modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["blog", "app"]);
    assert_eq!(plan.providers, vec!["Acme\\Blog\\BlogServiceProvider"]);
    assert_eq!(plan.deferred["blog.feed"], "Acme\\Blog\\FeedProvider");
    assert_eq!(plan.aliases["Blog"], "Acme\\Blog\\Facades\\Blog");
}

#[test]
fn manifest_errors_do_not_abort_the_scan() {
    let app = App::new();
    let broken = app.path("modules/pkg-z");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("composer.json"), "[1, 2").unwrap();

    let manager = ModuleManager::new(app.options()).unwrap();
    let summary = manager.scan(false).unwrap();
    assert_eq!(summary.modules, 3);
    assert_eq!(summary.errors.len(), 1);
    assert!(!app.path("bootstrap/cache/modules.json").exists());
}
