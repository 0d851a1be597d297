//! Relation adapters writing to the unit store and publishing over a relation

use std::collections::BTreeMap;

use url::Url;

use gitlab_charm::relations::db::{
    remove_db_conf, remove_mysql_conf, save_db_conf, save_mysql_conf, save_pgsql_conf,
};
use gitlab_charm::relations::redis::{remove_redis_conf, save_redis_conf};
use gitlab_charm::relations::{
    DbAdapter, DbEndpoint, MySqlEndpoint, PostgreSqlEndpoint, ProxyConfig, ProxyConfigError,
    ProxyStatus, RedisEndpoint, ReverseProxyRequires, RunnerProvides, RunnerSettings,
    build_proxy_rules,
};
use gitlab_charm::store::keys;
use gitlab_charm::store::{ConfigStore, ConfigStoreExt, MemoryStore};

use crate::common::FakeRelation;

fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

mod database_tests {
    use super::*;

    #[test]
    fn test_db_endpoint_saved_with_adapter() {
        let mut store = MemoryStore::new();
        let endpoint = DbEndpoint::from_relation_data(&data(&[(
            "master",
            "dbname=gitlab host=10.0.0.6 port=5433 user=juju_gitlab password='p w'",
        )]))
        .unwrap()
        .unwrap();

        save_db_conf(&mut store, &endpoint).unwrap();

        assert_eq!(store.get_string(keys::DB_HOST).unwrap().as_deref(), Some("10.0.0.6"));
        assert_eq!(store.get_string(keys::DB_PORT).unwrap().as_deref(), Some("5433"));
        assert_eq!(store.get_string(keys::DB_PASS).unwrap().as_deref(), Some("p w"));
        assert_eq!(
            store.get_string(keys::DB_ADAPTER).unwrap().as_deref(),
            Some(DbAdapter::Postgresql.as_str())
        );

        remove_db_conf(&mut store).unwrap();
        assert!(!store.all_set(&keys::DB.all()).unwrap());
        assert_eq!(store.get(keys::DB_ADAPTER).unwrap(), None);
    }

    #[test]
    fn test_pgsql_saved_from_master() {
        let mut store = MemoryStore::new();
        let endpoint = PostgreSqlEndpoint::from_relation_data(&data(&[(
            "master",
            "dbname=gitlab host=10.0.0.10 user=gitlab password=secret",
        )]))
        .unwrap()
        .unwrap();

        save_pgsql_conf(&mut store, &endpoint).unwrap();

        assert!(store.all_set(&keys::PGSQL.all()).unwrap());
        // libpq default port when the provider omits it
        assert_eq!(store.get_string(keys::PGSQL_PORT).unwrap().as_deref(), Some("5432"));
    }

    #[test]
    fn test_mysql_saved_and_removed() {
        let mut store = MemoryStore::new();
        let endpoint = MySqlEndpoint::from_relation_data(&data(&[
            ("host", "10.0.0.20"),
            ("port", ""),
            ("database", "gitlab"),
            ("user", "gitlab"),
            ("password", "secret"),
        ]))
        .unwrap()
        .unwrap();

        save_mysql_conf(&mut store, &endpoint).unwrap();
        assert_eq!(store.get_string(keys::MYSQL_PORT).unwrap().as_deref(), Some("3306"));

        remove_mysql_conf(&mut store).unwrap();
        for key in keys::MYSQL.all() {
            assert!(!store.is_set(key).unwrap());
        }
    }

    #[test]
    fn test_mysql_waits_for_host() {
        let pending = data(&[("database", "gitlab")]);
        assert!(MySqlEndpoint::from_relation_data(&pending).unwrap().is_none());
    }

    #[test]
    fn test_mysql_incomplete_waits_for_credentials() {
        let incomplete = data(&[("host", "10.0.0.20"), ("database", "gitlab")]);
        assert!(MySqlEndpoint::from_relation_data(&incomplete).unwrap().is_none());
        assert!(DbEndpoint::from_relation_data(&incomplete).unwrap().is_none());
    }
}

mod redis_tests {
    use super::*;

    #[test]
    fn test_redis_round_trip_through_store() {
        let mut store = MemoryStore::new();
        let endpoint = RedisEndpoint::from_relation_data(&data(&[
            ("host", "10.0.0.40"),
            ("port", "6379"),
            ("password", "hunter2"),
        ]))
        .unwrap();
        save_redis_conf(&mut store, &endpoint).unwrap();
        assert!(store.all_set(&keys::REDIS).unwrap());

        let no_password = RedisEndpoint::from_relation_data(&data(&[
            ("host", "10.0.0.40"),
            ("port", "6379"),
            ("password", ""),
        ]))
        .unwrap();
        assert_eq!(no_password.password, None);
        save_redis_conf(&mut store, &no_password).unwrap();
        assert_eq!(store.get(keys::REDIS_PASS).unwrap(), None);

        remove_redis_conf(&mut store).unwrap();
        assert!(!store.is_set(keys::REDIS_HOST).unwrap());
    }
}

mod reverseproxy_tests {
    use super::*;

    #[test]
    fn test_publishes_rules_as_json_list() {
        let url = Url::parse("http://gitlab.example.com").unwrap();
        let config = ProxyConfig::new(build_proxy_rules(&url, "10.1.1.1", 80, 2222, 22)).unwrap();
        let mut relation = FakeRelation::default();

        ReverseProxyRequires::new(&mut relation)
            .configure(&config)
            .unwrap();

        let published: serde_json::Value =
            serde_json::from_str(&relation.local["config"]).unwrap();
        let rules = published.as_array().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0]["external_port"], 80);
        assert_eq!(rules[0]["subdomain"], "gitlab.example.com");
        assert!(rules[0].get("urlbase").is_none());
        assert_eq!(rules[1]["mode"], "tcp");
        assert!(rules[1].get("subdomain").is_none());
    }

    #[test]
    fn test_status_keyed_by_local_unit() {
        let mut relation = FakeRelation::with_remote(&[
            ("gitlab/1.cfg_status", "failed: other unit"),
            ("gitlab/0.cfg_status", "passed: ok"),
        ]);
        let proxy = ReverseProxyRequires::new(&mut relation);

        assert_eq!(
            proxy.status("gitlab/0").unwrap(),
            ProxyStatus::Passed("passed: ok".to_string())
        );
        assert!(matches!(
            proxy.status("gitlab/1").unwrap().into_result(),
            Err(ProxyConfigError::Rejected(_))
        ));
        assert_eq!(proxy.status("gitlab/2").unwrap(), ProxyStatus::Pending);
    }

    #[test]
    fn test_empty_rule_set_rejected() {
        assert_eq!(ProxyConfig::new(Vec::new()).unwrap_err(), ProxyConfigError::NoRules);
    }
}

mod runner_tests {
    use super::*;

    #[test]
    fn test_publishes_url_and_token() {
        let mut relation = FakeRelation::default();
        RunnerProvides::new(&mut relation)
            .publish(&RunnerSettings {
                url: "https://git.example.com".to_string(),
                token: Some("tok3n".to_string()),
            })
            .unwrap();
        assert_eq!(relation.local["url"], "https://git.example.com");
        assert_eq!(relation.local["token"], "tok3n");
    }

    #[test]
    fn test_empty_token_not_published() {
        let mut relation = FakeRelation::default();
        RunnerProvides::new(&mut relation)
            .publish(&RunnerSettings {
                url: "http://gitlab".to_string(),
                token: Some(String::new()),
            })
            .unwrap();
        assert!(!relation.local.contains_key("token"));
    }
}
