//!
//! Request dispatch for parameter servers.
//!
//! The dispatcher owns a worker pool and a single scheduling loop.  The loop
//! waits on the node's routed request channel and on the shutdown signals,
//! and hands every request to the pool so slow handlers never block the
//! loop.  Once a shutdown signal fires the loop stops accepting requests and
//! waits for the pool to finish everything already handed to it.
//!

use std::{cmp::max, sync::Arc};

use crossbeam::{
    channel::{self, Receiver, TryRecvError},
    select,
};
use quanta::Clock;
use threadpool::ThreadPool;
use tracing::{debug, info, trace, warn, Span};

use pcomm_core::{Addressed, Publisher, Server};
use pcomm_pubsub::{LocalSubscriber, LocalTopic};

use crate::config::ServerConfig;
use crate::events::ChangeEventPublisher;
use crate::messages::{
    DeleteParametersRequest, DeleteParametersResponse, GetParametersRequest,
    GetParametersResponse, ListParametersRequest, ListParametersResponse, ParameterEvent,
    ParameterRequest, ParameterResponse, SetParametersRequest, SetParametersResponse,
};
use crate::store::{MutationOutcome, ParameterStore};
use crate::types::Parameter;

/// Answers the requests addressed to one node from that node's store.
///
/// Mutations publish their change event before the response is produced,
/// so a caller that sees a successful set can already find the event.
pub struct RequestHandler {
    store: Arc<ParameterStore>,
    config: ServerConfig,
    events: ChangeEventPublisher,
    span: Span,
}

impl RequestHandler {
    pub fn new(
        store: Arc<ParameterStore>,
        config: ServerConfig,
        events: ChangeEventPublisher,
        span: Span,
    ) -> Self {
        Self {
            store,
            config,
            events,
            span,
        }
    }

    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }

    /// Validate and apply a batch, publishing the resulting event
    pub fn apply_set(&self, parameters: Vec<Parameter>) -> MutationOutcome {
        let outcome = self.store.set_parameters_and_notify(
            parameters,
            |index, parameter| self.config.validate(index, parameter),
            |event| self.publish_event(event),
        );

        let rejected = outcome.results.iter().filter(|r| !r.successful).count();
        if rejected > 0 {
            warn!(
                parent: &self.span,
                rejected,
                total = outcome.results.len(),
                "rejected parameters in set request"
            );
        }
        outcome
    }

    /// Apply parameters that were already validated as a whole, publishing
    /// the resulting event
    pub(crate) fn apply_validated(&self, parameters: Vec<Parameter>) -> MutationOutcome {
        self.store.set_parameters_and_notify(
            parameters,
            |_, _| Ok(()),
            |event| self.publish_event(event),
        )
    }

    /// Remove parameters, publishing the resulting event
    pub fn apply_delete(&self, names: Vec<String>) -> MutationOutcome {
        self.store
            .delete_parameters_and_notify(names, |event| self.publish_event(event))
    }

    fn publish_event(&self, event: &ParameterEvent) {
        if let Err(never) = self.events.publish(event.clone()) {
            match never {}
        }
    }

    fn handle_set(&self, request: SetParametersRequest) -> SetParametersResponse {
        let outcome = self.apply_set(request.parameters);
        SetParametersResponse {
            node_id: self.store.node_id().to_string(),
            request_id: request.request_id,
            requester: request.requester,
            results: outcome.results,
        }
    }

    fn handle_get(&self, request: GetParametersRequest) -> GetParametersResponse {
        GetParametersResponse {
            node_id: self.store.node_id().to_string(),
            request_id: request.request_id,
            requester: request.requester,
            parameters: self.store.get_parameters(&request.names),
        }
    }

    fn handle_list(&self, request: ListParametersRequest) -> ListParametersResponse {
        ListParametersResponse {
            node_id: self.store.node_id().to_string(),
            request_id: request.request_id,
            requester: request.requester,
            names: self.store.list_parameters(&request.prefixes, request.depth),
        }
    }

    fn handle_delete(&self, request: DeleteParametersRequest) -> DeleteParametersResponse {
        let outcome = self.apply_delete(request.names);
        DeleteParametersResponse {
            node_id: self.store.node_id().to_string(),
            request_id: request.request_id,
            requester: request.requester,
            results: outcome.results,
        }
    }
}

impl Server for RequestHandler {
    type Request = ParameterRequest;
    type Response = ParameterResponse;

    fn node_id(&self) -> &str {
        self.store.node_id()
    }

    fn handle_request(&self, request: Self::Request) -> Self::Response {
        match request {
            ParameterRequest::Set(request) => ParameterResponse::Set(self.handle_set(request)),
            ParameterRequest::Get(request) => ParameterResponse::Get(self.handle_get(request)),
            ParameterRequest::List(request) => ParameterResponse::List(self.handle_list(request)),
            ParameterRequest::Delete(request) => {
                ParameterResponse::Delete(self.handle_delete(request))
            }
        }
    }
}

/// Schedules a node's requests onto a worker pool
pub struct ServerDispatcher {
    handler: Arc<RequestHandler>,
    responses: LocalTopic<ParameterResponse>,
    // The quanta high-precision clock used to time handlers
    clock: Clock,
    pool: ThreadPool,
    span: Span,
}

impl ServerDispatcher {
    pub fn new(
        handler: Arc<RequestHandler>,
        responses: LocalTopic<ParameterResponse>,
        worker_threads: usize,
        span: Span,
    ) -> Self {
        Self {
            handler,
            responses,
            clock: Clock::new(),
            pool: ThreadPool::new(max(1, worker_threads)),
            span,
        }
    }

    /// Hand a request to the worker pool.  The response is published on
    /// the response topic once the handler returns.
    pub fn dispatch(&self, request: ParameterRequest) {
        let handler = self.handler.clone();
        let responses = self.responses.clone();
        let clock = self.clock.clone();
        let span = self.span.clone();

        self.pool.execute(move || {
            let kind = request.kind();
            let request_id = request.request_id();
            let requester = request.requester();

            let start = clock.now();
            let response = handler.handle_request(request);
            let elapsed = clock.now().duration_since(start);

            trace!(
                parent: &span,
                kind,
                request_id,
                %requester,
                elapsed_us = elapsed.as_micros() as u64,
                "handled request"
            );
            if let Err(never) = responses.publish(response) {
                match never {}
            }
        });
    }

    /// The number of requests currently being handled
    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    /// The number of requests waiting for a free worker
    pub fn queued_count(&self) -> usize {
        self.pool.queued_count()
    }

    /// Dispatch requests until any of `shutdown` fires, then drain the
    /// pool.
    ///
    /// Each shutdown receiver is expected to never yield a value and to
    /// disconnect when its signal fires, like `Interrupt::receiver`.
    pub fn run(self, requests: LocalSubscriber<ParameterRequest>, shutdown: &[Receiver<()>]) {
        info!(
            parent: &self.span,
            worker_threads = self.pool.max_count(),
            "dispatching parameter requests"
        );

        let bus_shutdown = shutdown.first().cloned().unwrap_or_else(channel::never);
        let local_shutdown = shutdown.get(1).cloned().unwrap_or_else(channel::never);

        loop {
            select! {
                recv(requests.receiver()) -> request => match request {
                    Ok(request) => {
                        // A fired shutdown wins over queued requests.
                        if fired(&bus_shutdown) || fired(&local_shutdown) {
                            break;
                        }
                        debug!(
                            parent: &self.span,
                            kind = request.kind(),
                            request_id = request.request_id(),
                            "received request"
                        );
                        self.dispatch(request);
                    }
                    Err(_) => break,
                },
                recv(bus_shutdown) -> _ => break,
                recv(local_shutdown) -> _ => break,
            }
        }

        // Stop routing before draining so nothing new is queued.
        drop(requests);

        let in_flight = self.active_count() + self.queued_count();
        info!(parent: &self.span, in_flight, "draining parameter requests");
        self.pool.join();
        info!(parent: &self.span, "parameter dispatcher stopped");
    }
}

fn fired(shutdown: &Receiver<()>) -> bool {
    matches!(shutdown.try_recv(), Err(TryRecvError::Disconnected))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{thread, time::Duration};

    use pcomm_core::{Correlated, Interrupt};
    use pcomm_pubsub::LocalRetainedTopic;

    use crate::events::{event_key, ParameterEventSubscriber};
    use crate::messages::ClientId;
    use crate::router::RequestRouter;

    fn handler(config: ServerConfig) -> (RequestHandler, LocalRetainedTopic<ParameterEvent, String>) {
        let events = LocalRetainedTopic::new(Arc::new(event_key));
        let handler = RequestHandler::new(
            Arc::new(ParameterStore::new("robot1")),
            config,
            ChangeEventPublisher::new(events.clone(), Span::none()),
            Span::none(),
        );
        (handler, events)
    }

    fn set(request_id: u64, parameters: Vec<Parameter>) -> ParameterRequest {
        ParameterRequest::Set(SetParametersRequest {
            target_node_id: String::from("robot1"),
            request_id,
            requester: ClientId(1),
            parameters,
        })
    }

    fn get(request_id: u64, names: &[&str]) -> ParameterRequest {
        ParameterRequest::Get(GetParametersRequest {
            target_node_id: String::from("robot1"),
            request_id,
            requester: ClientId(1),
            names: names.iter().map(|name| name.to_string()).collect(),
        })
    }

    #[test]
    fn test_handle_set_then_get() {
        let (handler, events) = handler(ServerConfig::default());
        let mut subscriber = ParameterEventSubscriber::new(&events);

        let response = handler.handle_request(set(1, vec![Parameter::new("speed", 1.5)]));
        assert_eq!(response.node_id(), "robot1");
        assert_eq!(Correlated::request_id(&response), 1);
        match response {
            ParameterResponse::Set(response) => {
                assert_eq!(response.results.len(), 1);
                assert!(response.results[0].successful);
            }
            other => panic!("unexpected response {:?}", other),
        }

        let event = subscriber.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event.new_parameters, vec![Parameter::new("speed", 1.5)]);

        match handler.handle_request(get(2, &["speed", "missing"])) {
            ParameterResponse::Get(response) => {
                assert_eq!(response.parameters, vec![Parameter::new("speed", 1.5)]);
                assert_eq!(response.requester, ClientId(1));
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_handle_set_with_validation() {
        let config = ServerConfig::builder()
            .on_set(|parameter| match parameter.value.as_double() {
                Some(speed) if speed > 10.0 => Err(String::from("too fast")),
                _ => Ok(()),
            })
            .build();
        let (handler, _events) = handler(config);

        let response = handler.handle_request(set(
            1,
            vec![Parameter::new("speed", 20.0), Parameter::new("mode", "auto")],
        ));
        match response {
            ParameterResponse::Set(response) => {
                assert!(!response.results[0].successful);
                assert_eq!(response.results[0].reason, "too fast");
                assert!(response.results[1].successful);
            }
            other => panic!("unexpected response {:?}", other),
        }
        assert!(!handler.store().contains("speed"));
        assert!(handler.store().contains("mode"));
    }

    #[test]
    fn test_handle_requests_in_order() {
        let (handler, _events) = handler(ServerConfig::default());
        let responses = handler.handle_requests(vec![
            set(1, vec![Parameter::new("a", true)]),
            get(2, &["a"]),
        ]);
        let ids: Vec<u64> = responses.iter().map(Correlated::request_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_dispatcher_answers_and_drains() {
        let (handler, _events) = handler(ServerConfig::default());
        let requests = LocalTopic::new();
        let responses = LocalTopic::new();
        let mut replies = responses.subscribe();

        let routed = RequestRouter::new("robot1").route(&requests);
        let dispatcher = ServerDispatcher::new(Arc::new(handler), responses.clone(), 2, Span::none());
        let interrupt = Interrupt::new();
        let shutdown = vec![interrupt.receiver()];
        let worker = thread::spawn(move || dispatcher.run(routed, &shutdown));

        for request_id in 0..10 {
            requests
                .publish(set(request_id, vec![Parameter::new("count", request_id as i64)]))
                .unwrap();
        }

        let mut answered = 0;
        while answered < 10 {
            assert!(replies.recv_timeout(Duration::from_secs(1)).is_some());
            answered += 1;
        }

        interrupt.trigger();
        worker.join().unwrap();
        assert!(replies.poll().is_empty());
    }
}
