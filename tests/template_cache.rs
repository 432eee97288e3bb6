use netflow_collector::variable_versions::cache::{TemplateCache, TemplateKey};
use netflow_collector::variable_versions::template::{CompiledField, Decode, Template};

use std::thread;
use std::time::Duration;

fn template(width: usize) -> Template {
    Template::new(vec![CompiledField::new("counter", Decode::UInt(width))])
        .expect("non-zero width")
}

fn key(source_id: u32, template_id: u16, exporter: &str) -> TemplateKey {
    TemplateKey::new(source_id, template_id, exporter.parse().unwrap())
}

#[test]
fn test_get_returns_cached_template() {
    let cache = TemplateCache::new(Duration::from_secs(60), 16);
    cache.put(key(1, 256, "192.0.2.1:2055"), template(4));

    let cached = cache.get(&key(1, 256, "192.0.2.1:2055")).unwrap();
    assert_eq!(cached.width(), 4);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_keys_isolate_exporters_and_source_ids() {
    let cache = TemplateCache::new(Duration::from_secs(60), 16);
    // Same template id everywhere, four distinct identities.
    cache.put(key(1, 256, "192.0.2.1:2055"), template(4));
    cache.put(key(1, 256, "192.0.2.2:2055"), template(8));
    cache.put(key(2, 256, "192.0.2.1:2055"), template(2));
    cache.put(key(1, 256, "192.0.2.1:9995"), template(1));

    assert_eq!(cache.len(), 4);
    assert_eq!(cache.get(&key(1, 256, "192.0.2.1:2055")).unwrap().width(), 4);
    assert_eq!(cache.get(&key(1, 256, "192.0.2.2:2055")).unwrap().width(), 8);
    assert_eq!(cache.get(&key(2, 256, "192.0.2.1:2055")).unwrap().width(), 2);
    assert_eq!(cache.get(&key(1, 256, "192.0.2.1:9995")).unwrap().width(), 1);
}

#[test]
fn test_replacement_under_the_same_key() {
    let cache = TemplateCache::new(Duration::from_secs(60), 16);
    cache.put(key(1, 256, "192.0.2.1:2055"), template(4));
    cache.put(key(1, 256, "192.0.2.1:2055"), template(8));

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(&key(1, 256, "192.0.2.1:2055")).unwrap().width(), 8);
}

#[test]
fn test_expired_entry_is_a_miss() {
    let cache = TemplateCache::new(Duration::from_millis(80), 16);
    cache.put(key(1, 256, "192.0.2.1:2055"), template(4));

    thread::sleep(Duration::from_millis(120));
    assert!(cache.get(&key(1, 256, "192.0.2.1:2055")).is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_get_slides_the_ttl_window() {
    let cache = TemplateCache::new(Duration::from_millis(200), 16);
    cache.put(key(1, 256, "192.0.2.1:2055"), template(4));

    // Keep touching the entry more often than the TTL; it must survive well
    // past the original expiry.
    for _ in 0..4 {
        thread::sleep(Duration::from_millis(100));
        assert!(cache.get(&key(1, 256, "192.0.2.1:2055")).is_some());
    }

    // Once the touches stop, it ages out.
    thread::sleep(Duration::from_millis(250));
    assert!(cache.get(&key(1, 256, "192.0.2.1:2055")).is_none());
}

#[test]
fn test_put_sweeps_expired_entries() {
    let cache = TemplateCache::new(Duration::from_millis(80), 16);
    cache.put(key(1, 256, "192.0.2.1:2055"), template(4));
    cache.put(key(1, 257, "192.0.2.1:2055"), template(4));

    thread::sleep(Duration::from_millis(120));
    let swept = cache.put(key(1, 258, "192.0.2.1:2055"), template(4));
    assert_eq!(swept, 2);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_sweep_reports_removals() {
    let cache = TemplateCache::new(Duration::from_millis(80), 16);
    cache.put(key(1, 256, "192.0.2.1:2055"), template(4));
    assert_eq!(cache.sweep(), 0);

    thread::sleep(Duration::from_millis(120));
    assert_eq!(cache.sweep(), 1);
    assert!(cache.is_empty());
}

#[test]
fn test_capacity_bounds_the_cache() {
    let cache = TemplateCache::new(Duration::from_secs(60), 2);
    cache.put(key(1, 256, "192.0.2.1:2055"), template(4));
    cache.put(key(1, 257, "192.0.2.1:2055"), template(4));
    cache.put(key(1, 258, "192.0.2.1:2055"), template(4));

    // Least recently used entry was evicted.
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&key(1, 256, "192.0.2.1:2055")).is_none());
    assert!(cache.get(&key(1, 258, "192.0.2.1:2055")).is_some());
}
