//! Late fetch results must never populate a superseded level

mod common;

use offer_cascade::{ApplyOutcome, Level, OptionSet, Role, SelectOutcome, SourceError};

use common::{ids, open, source, walk};

fn ticket_of(outcome: SelectOutcome) -> offer_cascade::FetchTicket {
    match outcome {
        SelectOutcome::FetchRequired(ticket) => ticket,
        other => panic!("expected a fetch ticket, got {other:?}"),
    }
}

#[tokio::test]
async fn test_late_response_for_superseded_parent_is_discarded() {
    let source = source();
    let mut session = open(&source, "owner-1", Role::ChannelOwner).await;
    walk(&mut session, &[(Level::Channel, "ch-x")]).await;

    let first = ticket_of(
        session
            .begin_select(Level::ContractLine, &"cl-1".into())
            .unwrap(),
    );
    let in_flight = tokio::spawn({
        let fetcher = session.fetcher();
        async move { fetcher.fetch(first).await }
    });

    let second = ticket_of(
        session
            .begin_select(Level::ContractLine, &"cl-2".into())
            .unwrap(),
    );
    let current = session.fetcher().fetch(second).await;
    assert!(matches!(
        session.apply(current).unwrap(),
        ApplyOutcome::Applied {
            level: Level::Service,
            count: 1
        }
    ));

    let late = in_flight.await.unwrap();
    assert_eq!(session.apply(late).unwrap(), ApplyOutcome::Stale);
    assert_eq!(ids(&session, Level::Service), vec!["svc-3"]);
}

#[tokio::test]
async fn test_stale_response_arriving_first_is_discarded() {
    let source = source();
    let mut session = open(&source, "owner-1", Role::ChannelOwner).await;
    walk(&mut session, &[(Level::Channel, "ch-x")]).await;

    let first = ticket_of(
        session
            .begin_select(Level::ContractLine, &"cl-1".into())
            .unwrap(),
    );
    let second = ticket_of(
        session
            .begin_select(Level::ContractLine, &"cl-2".into())
            .unwrap(),
    );
    let fetcher = session.fetcher();

    let late = fetcher.fetch(first).await;
    assert_eq!(session.apply(late).unwrap(), ApplyOutcome::Stale);
    assert!(session.resolver().option_set(Level::Service).is_pending());

    let current = fetcher.fetch(second).await;
    session.apply(current).unwrap();
    assert_eq!(ids(&session, Level::Service), vec!["svc-3"]);
}

#[tokio::test]
async fn test_upstream_reselect_discards_deeper_pending_fetch() {
    let source = source();
    let mut session = open(&source, "owner-1", Role::ChannelOwner).await;
    walk(
        &mut session,
        &[(Level::Channel, "ch-x"), (Level::ContractLine, "cl-1")],
    )
    .await;

    // Contract types of svc-1 are requested, then the line changes.
    let types = ticket_of(session.begin_select(Level::Service, &"svc-1".into()).unwrap());
    assert_eq!(types.level, Level::ContractType);
    let services = ticket_of(
        session
            .begin_select(Level::ContractLine, &"cl-2".into())
            .unwrap(),
    );

    let fetcher = session.fetcher();
    let late = fetcher.fetch(types).await;
    assert_eq!(session.apply(late).unwrap(), ApplyOutcome::Stale);
    assert_eq!(
        session.resolver().option_set(Level::ContractType),
        &OptionSet::Empty
    );

    session.apply(fetcher.fetch(services).await).unwrap();
    assert_eq!(ids(&session, Level::Service), vec!["svc-3"]);
    assert!(session.current_options(Level::ContractType).is_empty());
}

#[tokio::test]
async fn test_reset_supersedes_pending_fetch() {
    let source = source();
    let mut session = open(&source, "owner-1", Role::ChannelOwner).await;
    walk(&mut session, &[(Level::Channel, "ch-x")]).await;

    let ticket = ticket_of(
        session
            .begin_select(Level::ContractLine, &"cl-1".into())
            .unwrap(),
    );
    session.reset(Level::ContractLine).unwrap();

    let late = session.fetcher().fetch(ticket).await;
    assert_eq!(session.apply(late).unwrap(), ApplyOutcome::Stale);
    assert!(session.current_options(Level::Service).is_empty());
    assert_eq!(session.frontier(), Some(Level::ContractLine));
}

#[tokio::test]
async fn test_failure_of_superseded_fetch_is_ignored() {
    let source = source();
    let mut session = open(&source, "owner-1", Role::ChannelOwner).await;
    walk(&mut session, &[(Level::Channel, "ch-x")]).await;

    source
        .fail_next(
            Level::Service,
            Some("cl-1"),
            SourceError::Malformed("truncated body".into()),
        )
        .await;
    let first = ticket_of(
        session
            .begin_select(Level::ContractLine, &"cl-1".into())
            .unwrap(),
    );
    let second = ticket_of(
        session
            .begin_select(Level::ContractLine, &"cl-2".into())
            .unwrap(),
    );

    let fetcher = session.fetcher();
    let failed = fetcher.fetch(first).await;
    assert!(failed.result.is_err());
    assert_eq!(session.apply(failed).unwrap(), ApplyOutcome::Stale);
    assert!(session.resolver().aborted().is_none());

    session.apply(fetcher.fetch(second).await).unwrap();
    assert_eq!(ids(&session, Level::Service), vec!["svc-3"]);
}
