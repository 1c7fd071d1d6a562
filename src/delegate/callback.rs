//! Names for every callback the engine can issue.

/// Which group of delegate methods a callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Session,
    Task,
    Data,
    Download,
    Stream,
    WebSocket,
}

/// Selector for one callback, used for capability probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    // Session
    SessionDidBecomeInvalid,
    SessionDidReceiveChallenge,

    // Task
    DidCreateTask,
    WillBeginDelayedRequest,
    TaskIsWaitingForConnectivity,
    WillPerformHttpRedirection,
    TaskDidReceiveChallenge,
    NeedNewBodyStream,
    DidSendBodyData,
    DidFinishCollectingMetrics,
    DidComplete,

    // Data
    DidReceiveResponse,
    DidReceiveData,
    WillCacheResponse,

    // Download
    DidWriteData,
    DidResumeAtOffset,
    DidFinishDownloading,

    // Stream
    ReadClosed,
    WriteClosed,
    BetterRouteDiscovered,
    DidBecomeStreams,

    // WebSocket
    WebSocketDidOpen,
    WebSocketDidClose,
}

impl Callback {
    pub const ALL: [Callback; 23] = [
        Callback::SessionDidBecomeInvalid,
        Callback::SessionDidReceiveChallenge,
        Callback::DidCreateTask,
        Callback::WillBeginDelayedRequest,
        Callback::TaskIsWaitingForConnectivity,
        Callback::WillPerformHttpRedirection,
        Callback::TaskDidReceiveChallenge,
        Callback::NeedNewBodyStream,
        Callback::DidSendBodyData,
        Callback::DidFinishCollectingMetrics,
        Callback::DidComplete,
        Callback::DidReceiveResponse,
        Callback::DidReceiveData,
        Callback::WillCacheResponse,
        Callback::DidWriteData,
        Callback::DidResumeAtOffset,
        Callback::DidFinishDownloading,
        Callback::ReadClosed,
        Callback::WriteClosed,
        Callback::BetterRouteDiscovered,
        Callback::DidBecomeStreams,
        Callback::WebSocketDidOpen,
        Callback::WebSocketDidClose,
    ];

    pub fn capability(&self) -> Capability {
        match self {
            Callback::SessionDidBecomeInvalid | Callback::SessionDidReceiveChallenge => {
                Capability::Session
            }
            Callback::DidCreateTask
            | Callback::WillBeginDelayedRequest
            | Callback::TaskIsWaitingForConnectivity
            | Callback::WillPerformHttpRedirection
            | Callback::TaskDidReceiveChallenge
            | Callback::NeedNewBodyStream
            | Callback::DidSendBodyData
            | Callback::DidFinishCollectingMetrics
            | Callback::DidComplete => Capability::Task,
            Callback::DidReceiveResponse
            | Callback::DidReceiveData
            | Callback::WillCacheResponse => Capability::Data,
            Callback::DidWriteData
            | Callback::DidResumeAtOffset
            | Callback::DidFinishDownloading => Capability::Download,
            Callback::ReadClosed
            | Callback::WriteClosed
            | Callback::BetterRouteDiscovered
            | Callback::DidBecomeStreams => Capability::Stream,
            Callback::WebSocketDidOpen | Callback::WebSocketDidClose => Capability::WebSocket,
        }
    }

    /// Completion-style callbacks need exactly one decision.
    pub fn is_completion_style(&self) -> bool {
        matches!(
            self,
            Callback::SessionDidReceiveChallenge
                | Callback::WillBeginDelayedRequest
                | Callback::WillPerformHttpRedirection
                | Callback::TaskDidReceiveChallenge
                | Callback::NeedNewBodyStream
                | Callback::DidReceiveResponse
                | Callback::WillCacheResponse
        )
    }

    /// Presence-gated callbacks may only reach a delegate that implements
    /// them.
    pub fn is_presence_gated(&self) -> bool {
        matches!(self, Callback::DidFinishDownloading)
    }
}
