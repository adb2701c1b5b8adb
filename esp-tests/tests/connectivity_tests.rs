//! Integration Tests für die Fallback-Leiter des ConnectivityManagers
//!
//! Zeitlimits: Ethernet 10 s, WiFi 15 s, statisch 10 s, Cooldown 5 s

use esp_core::{
    AttemptTimeouts, ConnectionMethod, ConnectionState, ConnectivityManager, NetAction, NetEvent,
    SharedStatus, Transport, connection_indication,
};

fn manager(preferred: Transport) -> ConnectivityManager {
    ConnectivityManager::new(AttemptTimeouts::default(), preferred)
}

fn start(method: ConnectionMethod) -> Option<NetAction> {
    Some(NetAction::Start(method))
}

#[test]
fn test_full_ladder_then_cooldown() {
    let mut m = manager(Transport::Primary);

    assert_eq!(m.poll(0, None), start(ConnectionMethod::Primary));
    assert_eq!(m.poll(10_000, None), start(ConnectionMethod::Secondary));
    assert_eq!(m.state(), ConnectionState::TryingSecondary);
    assert_eq!(m.poll(24_999, None), None);
    assert_eq!(m.poll(25_000, None), start(ConnectionMethod::FallbackStatic));
    assert_eq!(m.poll(35_000, None), Some(NetAction::CycleFailed));
    assert_eq!(m.state(), ConnectionState::Disconnected);
    assert_eq!(m.next_deadline(), Some(40_000));

    // Neuer Zyklus nach dem Cooldown, wieder mit Ethernet
    assert_eq!(m.poll(40_000, None), start(ConnectionMethod::Primary));
}

#[test]
fn test_last_successful_secondary_goes_first() {
    let mut m = manager(Transport::Primary);
    m.poll(0, None);
    m.poll(10_000, None);

    assert_eq!(
        m.poll(12_000, Some(NetEvent::LinkUp(Transport::Secondary))),
        Some(NetAction::Connected(ConnectionMethod::Secondary))
    );
    assert_eq!(m.last_successful(), Transport::Secondary);

    assert_eq!(
        m.poll(20_000, Some(NetEvent::LinkDown(Transport::Secondary))),
        Some(NetAction::Disconnected)
    );
    assert_eq!(m.poll(24_999, None), None);

    // Leiter: WiFi DHCP, Ethernet, statisch
    assert_eq!(m.poll(25_000, None), start(ConnectionMethod::Secondary));
    assert_eq!(m.poll(40_000, None), start(ConnectionMethod::Primary));
    assert_eq!(m.poll(50_000, None), start(ConnectionMethod::FallbackStatic));
}

#[test]
fn test_static_success_not_remembered() {
    let mut m = manager(Transport::Primary);
    m.poll(0, None);
    m.poll(10_000, None);
    m.poll(25_000, None);

    assert_eq!(
        m.poll(26_000, Some(NetEvent::LinkUp(Transport::Secondary))),
        Some(NetAction::Connected(ConnectionMethod::FallbackStatic))
    );
    assert_eq!(m.last_successful(), Transport::Primary);

    m.poll(30_000, Some(NetEvent::LinkDown(Transport::Secondary)));
    assert_eq!(m.poll(35_000, None), start(ConnectionMethod::Primary));
}

#[test]
fn test_late_link_up_of_earlier_attempt() {
    let mut m = manager(Transport::Primary);
    m.poll(0, None);
    m.poll(10_000, None);

    // Ethernet kommt erst während des WiFi-Versuchs hoch
    assert_eq!(
        m.poll(11_000, Some(NetEvent::LinkUp(Transport::Primary))),
        Some(NetAction::Connected(ConnectionMethod::Primary))
    );
    assert_eq!(m.state(), ConnectionState::Connected(ConnectionMethod::Primary));
    assert_eq!(m.last_successful(), Transport::Primary);
}

#[test]
fn test_connected_ignores_second_link() {
    let mut m = manager(Transport::Secondary);
    assert_eq!(m.poll(0, None), start(ConnectionMethod::Secondary));
    m.poll(500, Some(NetEvent::LinkUp(Transport::Secondary)));

    assert_eq!(m.poll(600, Some(NetEvent::LinkUp(Transport::Primary))), None);
    assert_eq!(m.poll(700, Some(NetEvent::LinkDown(Transport::Primary))), None);
    assert_eq!(m.state(), ConnectionState::Connected(ConnectionMethod::Secondary));
    assert_eq!(m.next_deadline(), None);
}

#[test]
fn test_state_published_through_shared_status() {
    let status = SharedStatus::new();
    let mut m = manager(Transport::Primary);

    m.poll(0, None);
    status.set_connection(m.state());
    assert_eq!(status.connection(), ConnectionState::TryingPrimary);

    m.poll(100, Some(NetEvent::LinkUp(Transport::Primary)));
    status.set_connection(m.state());
    assert_eq!(
        status.connection(),
        ConnectionState::Connected(ConnectionMethod::Primary)
    );
}

#[test]
fn test_indication_per_method() {
    // DHCP: blau, aus, blau, aus, fertig
    assert!(connection_indication(ConnectionMethod::Secondary, 0).is_some_and(|c| c.b == 255));
    assert!(connection_indication(ConnectionMethod::Primary, 200).is_some_and(|c| c.b == 0));
    assert_eq!(connection_indication(ConnectionMethod::Primary, 600), None);

    // Statisch: 3 s grün
    assert!(
        connection_indication(ConnectionMethod::FallbackStatic, 2_999).is_some_and(|c| c.g == 255)
    );
    assert_eq!(connection_indication(ConnectionMethod::FallbackStatic, 3_000), None);
}
