#[cfg(test)]
mod center_tests {
    use crucible::center::PluginCenter;
    use crucible::config::CenterConfig;
    use crucible::error::{ErrorCode, PluginError};
    use crucible::events::PluginEvent;
    use crucible::host::StaticHost;
    use crucible::plugin::{PluginInput, PluginQuery, PluginType, PluginUpdate};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn quiet_config() -> CenterConfig {
        let mut config = CenterConfig::default();
        config.setting.auto_execute = false;
        config
    }

    fn center() -> PluginCenter {
        PluginCenter::new(quiet_config()).unwrap()
    }

    const NAMED_SCRIPT: &str = "\
-- ==Plugin==
-- @name         Foo
-- @description  Renames itself
-- ==/Plugin==
print('hello')";

    #[test]
    fn metadata_name_overrides_the_callers_name() {
        let mut center = center();
        let plugin = center
            .add(PluginInput::new("Caller Supplied", NAMED_SCRIPT))
            .unwrap();

        assert_eq!(plugin.name, "Foo");
        assert_eq!(plugin.description, "Renames itself");
        assert_eq!(center.get(&plugin.id).unwrap().name, "Foo");
    }

    #[test]
    fn empty_content_is_rejected_and_recorded() {
        let mut center = center();
        let err = center.add(PluginInput::new("empty", "   ")).unwrap_err();
        assert!(matches!(err, PluginError::Invalid(_)));

        let history = center.error_history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].code, ErrorCode::Invalid);
    }

    #[test]
    fn toggle_flips_and_reports_the_new_state() {
        let mut center = center();
        let plugin = center.add(PluginInput::new("t", "print('x')")).unwrap();
        assert!(plugin.enabled);

        assert!(!center.toggle(&plugin.id).unwrap());
        assert!(!center.get(&plugin.id).unwrap().enabled);
        assert!(center.toggle(&plugin.id).unwrap());
        assert!(center.get(&plugin.id).unwrap().enabled);
    }

    #[test]
    fn protected_plugins_can_never_be_deleted() {
        let mut center = center();
        let plugin = center
            .add(PluginInput::new("keeper", "print('x')").with_allow_delete(false))
            .unwrap();

        for _ in 0..3 {
            let err = center.delete(&plugin.id).unwrap_err();
            assert!(matches!(err, PluginError::DeleteForbidden(_)));
            assert!(center.get(&plugin.id).is_some());
        }
    }

    #[test]
    fn deleting_an_unknown_id_is_not_found() {
        let mut center = center();
        let err = center.delete("ghost").unwrap_err();
        assert!(matches!(err, PluginError::NotFound(_)));
    }

    #[test]
    fn updating_content_reparses_metadata() {
        let mut center = center();
        let plugin = center.add(PluginInput::new("before", "print('x')")).unwrap();
        assert!(plugin.metadata.as_ref().unwrap().is_empty());

        let updated = center
            .update(
                &plugin.id,
                PluginUpdate {
                    content: Some(NAMED_SCRIPT.to_string()),
                    ..PluginUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(updated.name, "Foo");
        assert_eq!(
            updated.metadata.as_ref().unwrap().name.as_deref(),
            Some("Foo")
        );
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn updating_the_enabled_flag_keeps_metadata_untouched() {
        let mut center = center();
        let plugin = center.add(PluginInput::new("flag", NAMED_SCRIPT)).unwrap();

        let updated = center
            .update(
                &plugin.id,
                PluginUpdate {
                    enabled: Some(false),
                    ..PluginUpdate::default()
                },
            )
            .unwrap();

        assert!(!updated.enabled);
        assert_eq!(updated.metadata, plugin.metadata);
        assert_eq!(updated.content, plugin.content);
    }

    #[test]
    fn queries_compose_with_and_semantics() {
        let mut center = center();
        center
            .add(PluginInput::new("Dark Mode", "print('a')").with_description("theme switcher"))
            .unwrap();
        let muted = center
            .add(PluginInput::new("Ad Muter", "print('b')").with_enabled(false))
            .unwrap();

        let by_name = center.get_many(&PluginQuery {
            name: Some("dark".to_string()),
            ..PluginQuery::default()
        });
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "Dark Mode");

        let by_description = center.get_many(&PluginQuery {
            name: Some("THEME".to_string()),
            ..PluginQuery::default()
        });
        assert_eq!(by_description.len(), 1);

        let disabled = center.get_many(&PluginQuery {
            enabled: Some(false),
            ..PluginQuery::default()
        });
        assert_eq!(disabled.len(), 1);
        assert_eq!(disabled[0].id, muted.id);

        let nothing = center.get_many(&PluginQuery {
            name: Some("dark".to_string()),
            enabled: Some(false),
            ..PluginQuery::default()
        });
        assert!(nothing.is_empty());

        let by_id = center.get_many(&PluginQuery {
            id: Some(muted.id.clone()),
            name: Some("no such plugin".to_string()),
            ..PluginQuery::default()
        });
        assert_eq!(by_id.len(), 1, "an id filter short-circuits the rest");
    }

    #[test]
    fn stats_count_in_one_pass() {
        let mut center = center();
        center.add(PluginInput::new("a", "print('a')")).unwrap();
        center
            .add(PluginInput::new("b", "print('b')").with_enabled(false))
            .unwrap();
        center
            .add(PluginInput::new("c", "print('c')").with_allow_delete(false))
            .unwrap();

        let stats = center.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.enabled, 2);
        assert_eq!(stats.disabled, 1);
        assert_eq!(stats.deletable, 2);
    }

    #[test]
    fn batch_add_partitions_failures_without_aborting() {
        let mut center = center();
        let result = center.batch_add(vec![
            PluginInput::new("ok-1", "print('1')"),
            PluginInput::new("broken", ""),
            PluginInput::new("ok-2", "print('2')"),
        ]);

        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].subject, "broken");
        assert_eq!(center.plugins().len(), 2);
    }

    #[test]
    fn batch_delete_partitions_by_outcome() {
        let mut center = center();
        let deletable = center.add(PluginInput::new("d", "print('d')")).unwrap();
        let keeper = center
            .add(PluginInput::new("k", "print('k')").with_allow_delete(false))
            .unwrap();

        let result = center.batch_delete(&[
            deletable.id.clone(),
            keeper.id.clone(),
            "ghost".to_string(),
        ]);

        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.failed.len(), 2);
        assert_eq!(center.plugins().len(), 1);
    }

    #[test]
    fn mutations_emit_exactly_one_typed_event() {
        let mut center = center();
        let log: Rc<RefCell<Vec<String>>> = Rc::default();

        for event in [
            PluginEvent::Added,
            PluginEvent::Deleted,
            PluginEvent::Enabled,
            PluginEvent::Disabled,
            PluginEvent::Updated,
        ] {
            let sink = Rc::clone(&log);
            center.on(event, move |_| sink.borrow_mut().push(event.to_string()));
        }

        let plugin = center.add(PluginInput::new("ev", "print('x')")).unwrap();
        center.disable(&plugin.id).unwrap();
        center.enable(&plugin.id).unwrap();
        center
            .update(
                &plugin.id,
                PluginUpdate {
                    description: Some("changed".to_string()),
                    ..PluginUpdate::default()
                },
            )
            .unwrap();
        center.delete(&plugin.id).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "pluginAdded",
                "pluginDisabled",
                "pluginEnabled",
                "pluginUpdated",
                "pluginDeleted"
            ]
        );
    }

    #[test]
    fn removed_listeners_stop_receiving_events() {
        let mut center = center();
        let hits: Rc<RefCell<u32>> = Rc::default();

        let sink = Rc::clone(&hits);
        let id = center.on(PluginEvent::Added, move |_| *sink.borrow_mut() += 1);

        center.add(PluginInput::new("one", "print('1')")).unwrap();
        assert!(center.off(PluginEvent::Added, id));
        center.add(PluginInput::new("two", "print('2')")).unwrap();

        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn construction_auto_executes_matched_script_plugins_once() {
        let executed: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = Rc::clone(&executed);

        let mut config = CenterConfig::default();
        config.plugins.push(PluginInput::new(
            "boot",
            "-- ==Plugin==\n-- @match *\n-- ==/Plugin==\nbooted = true",
        ));

        let center = PluginCenter::builder(config)
            .host(StaticHost::new("https://example.com/"))
            .on(PluginEvent::Executed, move |plugin| {
                sink.borrow_mut().push(plugin.id.clone())
            })
            .build()
            .unwrap();

        let fired = executed.borrow();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0], center.plugins()[0].id);
    }

    #[test]
    fn auto_execute_can_be_disabled() {
        let executed: Rc<RefCell<u32>> = Rc::default();
        let sink = Rc::clone(&executed);

        let mut config = quiet_config();
        config
            .plugins
            .push(PluginInput::new("idle", "print('never')"));

        PluginCenter::builder(config)
            .on(PluginEvent::Executed, move |_| *sink.borrow_mut() += 1)
            .build()
            .unwrap();

        assert_eq!(*executed.borrow(), 0);
    }

    #[test]
    fn execution_is_gated_by_match_rules() {
        let mut center = PluginCenter::builder(quiet_config())
            .host(StaticHost::new("https://elsewhere.org/"))
            .build()
            .unwrap();

        let plugin = center
            .add(PluginInput::new(
                "gated",
                "-- ==Plugin==\n-- @match https://a.com/**\n-- ==/Plugin==\nprint('x')",
            ))
            .unwrap();

        assert!(!center.execute(&plugin.id, None).unwrap());
        assert!(center.execute(&plugin.id, Some("https://a.com/x/y")).unwrap());
    }

    #[test]
    fn disabled_plugins_are_skipped() {
        let mut center = center();
        let plugin = center
            .add(PluginInput::new("off", "print('x')").with_enabled(false))
            .unwrap();
        assert!(!center.execute(&plugin.id, None).unwrap());
    }

    #[test]
    fn module_plugins_are_never_executed() {
        let mut center = center();
        let plugin = center
            .add(PluginInput::new("mod", "export local x = 1"))
            .unwrap();

        assert_eq!(plugin.kind, PluginType::Module);
        assert!(!center.execute(&plugin.id, None).unwrap());
        assert_eq!(center.execute_all(None), 0);
    }

    #[test]
    fn explicit_type_wins_over_detection() {
        let mut center = center();
        let plugin = center
            .add(PluginInput::new("forced", "print('no exports here')").with_kind(PluginType::Module))
            .unwrap();
        assert_eq!(plugin.kind, PluginType::Module);
    }

    #[test]
    fn sweep_isolates_individual_failures() {
        let mut config = quiet_config();
        config
            .plugins
            .push(PluginInput::new("bad", "error('boom')"));
        config.plugins.push(PluginInput::new("good", "print('ok')"));

        let mut center = PluginCenter::builder(config).build().unwrap();
        assert_eq!(center.execute_all(None), 1);

        let history = center.error_history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].code, ErrorCode::ExecutionFailed);
    }

    #[test]
    fn import_exports_returns_callable_bindings() {
        let mut center = center();
        let plugin = center
            .add(PluginInput::new(
                "mod",
                "export local test = function() return 1 end",
            ))
            .unwrap();

        let exports = center.import_exports(&plugin.id).unwrap();
        let mlua::Value::Function(test) = exports.get("test").unwrap() else {
            panic!("expected a function export");
        };
        assert_eq!(test.call::<_, i64>(()).unwrap(), 1);
    }

    #[test]
    fn import_exports_ignores_the_enabled_flag() {
        let mut center = center();
        let plugin = center
            .add(PluginInput::new("mod", "export local n = 7").with_enabled(false))
            .unwrap();

        let exports = center.import_exports(&plugin.id).unwrap();
        assert!(matches!(
            exports.get("n"),
            Some(mlua::Value::Integer(7))
        ));
    }

    #[test]
    fn check_match_uses_the_plugin_rules() {
        let mut center = center();
        let gated = center
            .add(PluginInput::new(
                "gated",
                "-- ==Plugin==\n-- @match https://a.com/**\n-- ==/Plugin==\nprint('x')",
            ))
            .unwrap();
        let open = center.add(PluginInput::new("open", "print('y')")).unwrap();

        assert!(center.check_match(&gated.id, Some("https://a.com/x/y")));
        assert!(!center.check_match(&gated.id, Some("https://b.com/")));
        assert!(center.check_match(&open.id, Some("https://anything.example/")));
        assert!(!center.check_match("ghost", Some("https://a.com/")));
    }

    #[test]
    fn error_handler_receives_failures_instead_of_the_log() {
        let mut center = center();
        let codes: Rc<RefCell<Vec<ErrorCode>>> = Rc::default();

        let sink = Rc::clone(&codes);
        center.set_error_handler(move |record| sink.borrow_mut().push(record.code));

        let _ = center.delete("ghost");
        assert_eq!(*codes.borrow(), vec![ErrorCode::NotFound]);
    }

    #[test]
    fn error_history_is_capped_and_keeps_the_newest() {
        let mut center = center();
        for i in 0..60 {
            let _ = center.delete(&format!("missing-{i}"));
        }

        let history = center.error_history(None);
        assert_eq!(history.len(), 50);
        assert_eq!(
            history.last().unwrap().plugin_id.as_deref(),
            Some("missing-59")
        );
        assert_eq!(center.error_history(Some(5)).len(), 5);
    }

    #[test]
    fn watch_sees_every_store_mutation() {
        let mut center = center();
        let sizes: Rc<RefCell<Vec<usize>>> = Rc::default();

        let sink = Rc::clone(&sizes);
        let sub = center.watch(move |plugins| sink.borrow_mut().push(plugins.len()));

        let plugin = center.add(PluginInput::new("w", "print('x')")).unwrap();
        center.delete(&plugin.id).unwrap();
        assert_eq!(*sizes.borrow(), vec![1, 0]);

        assert!(center.unwatch(sub));
        center.add(PluginInput::new("w2", "print('y')")).unwrap();
        assert_eq!(sizes.borrow().len(), 2);
    }

    #[test]
    fn clear_all_empties_the_collection() {
        let mut center = center();
        center.add(PluginInput::new("a", "print('a')")).unwrap();
        center.add(PluginInput::new("b", "print('b')")).unwrap();

        center.clear_all();
        assert!(center.plugins().is_empty());
        assert_eq!(center.stats().total, 0);
    }
}

#[cfg(test)]
mod roundtrip_tests {
    use crucible::center::PluginCenter;
    use crucible::config::CenterConfig;
    use crucible::plugin::PluginInput;

    fn quiet_config() -> CenterConfig {
        let mut config = CenterConfig::default();
        config.setting.auto_execute = false;
        config
    }

    #[test]
    fn export_then_import_reproduces_the_collection() {
        let mut source = PluginCenter::new(quiet_config()).unwrap();
        source
            .add(PluginInput::new("first", "print('1')"))
            .unwrap();
        source
            .add(PluginInput::new("second", "export local x = 2").with_enabled(false))
            .unwrap();

        let json = source.export_all();

        let mut target = PluginCenter::new(quiet_config()).unwrap();
        let summary = target.import_all(&json);
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.failed, 0);

        let originals = source.plugins();
        let imported = target.plugins();
        assert_eq!(originals.len(), imported.len());
        for (original, copy) in originals.iter().zip(&imported) {
            assert_eq!(original.id, copy.id);
            assert_eq!(original.content, copy.content);
            assert_eq!(original.enabled, copy.enabled);
            assert_eq!(original.kind, copy.kind);
            assert_eq!(original.metadata, copy.metadata);
        }
    }

    #[test]
    fn importing_the_same_collection_twice_rejects_duplicates() {
        let mut source = PluginCenter::new(quiet_config()).unwrap();
        source.add(PluginInput::new("only", "print('1')")).unwrap();
        let json = source.export_all();

        let mut target = PluginCenter::new(quiet_config()).unwrap();
        assert_eq!(target.import_all(&json).imported, 1);

        let second = target.import_all(&json);
        assert_eq!(second.imported, 0);
        assert_eq!(second.failed, 1);
        assert_eq!(target.plugins().len(), 1);
    }

    #[test]
    fn malformed_payloads_import_nothing() {
        let mut center = PluginCenter::new(quiet_config()).unwrap();

        for payload in ["{ not json", "\"a string\"", "{\"an\": \"object\"}"] {
            let summary = center.import_all(payload);
            assert_eq!(summary.imported, 0);
            assert_eq!(summary.failed, 0);
        }

        let partial = center.import_all(r#"[{"name": "missing required fields"}]"#);
        assert_eq!(partial.imported, 0);
        assert_eq!(partial.failed, 1);
    }
}

#[cfg(test)]
mod persistence_tests {
    use crucible::center::PluginCenter;
    use crucible::config::CenterConfig;
    use crucible::plugin::PluginInput;
    use crucible::storage::FileStorage;
    use tempfile::tempdir;

    fn quiet_config() -> CenterConfig {
        let mut config = CenterConfig::default();
        config.setting.auto_execute = false;
        config
    }

    #[test]
    fn plugins_survive_a_center_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plugins.json");

        let id = {
            let mut center = PluginCenter::builder(quiet_config())
                .storage(FileStorage::new(&path))
                .build()
                .unwrap();
            center
                .add(PluginInput::new("persisted", "print('hi')"))
                .unwrap()
                .id
        };

        let center = PluginCenter::builder(quiet_config())
            .storage(FileStorage::new(&path))
            .build()
            .unwrap();

        let plugins = center.plugins();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].id, id);
        assert_eq!(plugins[0].name, "persisted");
    }

    #[test]
    fn clear_all_also_clears_the_backing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plugins.json");

        {
            let mut center = PluginCenter::builder(quiet_config())
                .storage(FileStorage::new(&path))
                .build()
                .unwrap();
            center.add(PluginInput::new("gone", "print('x')")).unwrap();
            center.clear_all();
        }

        let center = PluginCenter::builder(quiet_config())
            .storage(FileStorage::new(&path))
            .build()
            .unwrap();
        assert!(center.plugins().is_empty());
    }
}

#[cfg(test)]
mod config_tests {
    use crucible::center::PluginCenter;
    use crucible::config::{CenterConfig, Mode};
    use crucible::error::PluginError;

    #[test]
    fn list_mode_without_a_mount_id_fails_construction() {
        let mut config = CenterConfig::default();
        config.setting.mode = Mode::List;

        let err = PluginCenter::new(config).unwrap_err();
        assert!(matches!(err, PluginError::ConfigInvalid(_)));
    }

    #[test]
    fn mode_can_be_switched_after_construction() {
        let mut center = PluginCenter::new(CenterConfig::default()).unwrap();
        assert_eq!(center.mode(), Mode::Api);

        center.set_mode(Mode::List, Some("plugin-root".to_string()));
        assert_eq!(center.mode(), Mode::List);
        assert_eq!(
            center.config().setting.mount_id.as_deref(),
            Some("plugin-root")
        );
    }
}

#[cfg(test)]
mod property_tests {
    use crucible::{matcher, metadata};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parse_is_deterministic(
            name in "[a-zA-Z][a-zA-Z0-9 ]{0,20}",
            pattern in "[a-z0-9:/.]{1,20}",
        ) {
            let content = format!(
                "-- ==Plugin==\n-- @name {name}\n-- @match {pattern}\n-- ==/Plugin==\nprint('x')"
            );
            prop_assert_eq!(metadata::parse(&content), metadata::parse(&content));
        }

        #[test]
        fn literal_patterns_match_themselves(url in "[a-zA-Z0-9:/.?=&_-]{0,30}") {
            prop_assert!(matcher::matches(&[url.clone()], &url));
        }

        #[test]
        fn literal_patterns_match_only_exact_urls(
            pattern in "[a-zA-Z0-9:/.?=&_-]{0,30}",
            url in "[a-zA-Z0-9:/.?=&_-]{0,30}",
        ) {
            prop_assert_eq!(matcher::matches(&[pattern.clone()], &url), pattern == url);
        }

        #[test]
        fn a_lone_star_matches_any_url(url in "[ -~]{0,40}") {
            prop_assert!(matcher::matches(&["*".to_string()], &url));
        }

        #[test]
        fn empty_rule_sets_allow_any_url(url in "[ -~]{0,40}") {
            prop_assert!(matcher::matches(&[], &url));
        }
    }
}
