//! 策略性质：对全部 角色 × 模式 组合逐一验证

use twin::core::SecurityErrorKind;
use twin::memory::MemoryType;
use twin::policy::{
    can_view_memory_type, context_depth, get_max_memories_for_role, get_tool_history_limit,
    redact_sensitive_data, should_capture_tool, CognitiveMode, SecurityPolicy, UserRole,
};

fn all_pairs() -> impl Iterator<Item = (CognitiveMode, UserRole)> {
    CognitiveMode::all()
        .into_iter()
        .flat_map(|m| UserRole::all().into_iter().map(move |r| (m, r)))
}

#[test]
fn emulation_never_writes() {
    for role in UserRole::all() {
        let p = SecurityPolicy::new(CognitiveMode::Emulation, role);
        assert!(!p.can_write_memory);
        assert_eq!(p.require_write().unwrap_err().kind, SecurityErrorKind::WriteDenied);
        assert!(!should_capture_tool(CognitiveMode::Emulation, "task_list"));
    }
}

#[test]
fn only_owner_changes_configuration() {
    for (mode, role) in all_pairs() {
        let p = SecurityPolicy::new(mode, role);
        if role != UserRole::Owner {
            assert!(!p.can_change_mode, "{mode} {role}");
            assert!(!p.can_factory_reset, "{mode} {role}");
            assert!(p.require_mode_change().is_err());
        }
        if matches!(role, UserRole::Guest | UserRole::Anonymous) {
            assert!(!p.can_use_operator && !p.can_write_memory, "{mode} {role}");
        }
    }
}

#[test]
fn low_trust_roles_see_no_tool_history() {
    for mode in CognitiveMode::all() {
        for role in [UserRole::Guest, UserRole::Anonymous] {
            assert_eq!(get_tool_history_limit(mode, role), 0);
            assert!(context_depth(mode, role) <= context_depth(mode, UserRole::Owner));
        }
    }
    assert_eq!(get_tool_history_limit(CognitiveMode::Emulation, UserRole::Owner), 0);
}

#[test]
fn private_memory_types_hidden_from_untrusted_roles() {
    for role in [UserRole::Guest, UserRole::Anonymous] {
        for kind in [MemoryType::Dream, MemoryType::InnerDialogue, MemoryType::Reflection] {
            assert!(!can_view_memory_type(kind, role));
        }
    }
    assert!(!can_view_memory_type(MemoryType::Dream, UserRole::Member));
    assert!(can_view_memory_type(MemoryType::Dream, UserRole::Owner));
}

#[test]
fn max_memories_shrink_with_trust() {
    let caps: Vec<usize> = UserRole::all()
        .into_iter()
        .map(get_max_memories_for_role)
        .collect();
    assert!(caps.windows(2).all(|w| w[0] >= w[1]), "{caps:?}");
}

#[test]
fn redaction_applies_only_to_untrusted_roles() {
    let text = "mail bob@example.com from 192.168.1.20 at /home/bob/notes.md";
    for role in UserRole::all() {
        let out = redact_sensitive_data(text, role);
        if role.is_trusted_viewer() {
            assert_eq!(out, text);
        } else {
            assert!(!out.contains("bob@example.com"), "{out}");
            assert!(!out.contains("192.168.1.20"), "{out}");
            assert!(!out.contains("/home/bob"), "{out}");
        }
    }
}
