//! Runnable renderer with lock-free scene and listener ingress.

use sf_core::{ConfigResult, DiagnosticCounters, Sample, SignalFlowContext, StatusSink};
use sf_graph::SignalFlow;
use sf_objects::ObjectVector;
use sf_param::{
    AsyncParameterBridge, AsyncReceiver, AsyncSender, DoubleBufferedCore, DoubleBufferedOutput,
    ListenerPositionParameter, ObjectVectorParameter,
};

use crate::core_renderer::{CoreRenderer, CoreRendererConfig};

/// Capacity of the scene/listener ingress rings. State-like updates only
/// need the latest value, so a small ring suffices.
const INGRESS_CAPACITY: usize = 16;

/// Thread-safe handle for pushing scene snapshots into the renderer.
pub struct SceneSender {
    sender: AsyncSender<ObjectVector>,
}

impl SceneSender {
    /// Send a scene snapshot; returns `false` when the ring is full and the
    /// snapshot was dropped.
    pub fn send(&mut self, scene: ObjectVector) -> bool {
        self.sender.send(scene)
    }
}

/// Thread-safe handle for pushing listener poses into the renderer.
pub struct ListenerSender {
    sender: AsyncSender<ListenerPositionParameter>,
}

impl ListenerSender {
    pub fn send(&mut self, listener: ListenerPositionParameter) -> bool {
        self.sender.send(listener)
    }
}

/// The complete renderer: a frozen [`SignalFlow`] built from the
/// [`CoreRenderer`] composite plus the asynchronous parameter ingress.
///
/// The audio driver calls [`process_block`](Self::process_block) once per
/// buffer; scene and listener updates may arrive from any other thread
/// through the sender handles and are applied at the next block boundary.
pub struct BaselineRenderer {
    flow: SignalFlow,
    scene_rx: AsyncReceiver<ObjectVector>,
    scene_port: DoubleBufferedOutput<ObjectVectorParameter>,
    listener_rx: Option<AsyncReceiver<ListenerPositionParameter>>,
    listener_port: Option<DoubleBufferedOutput<ListenerPositionParameter>>,
}

impl BaselineRenderer {
    /// Build and initialise the renderer. Returns the renderer plus the
    /// scene sender and, when tracking is enabled, the listener sender.
    pub fn new(
        context: SignalFlowContext,
        config: &CoreRendererConfig,
        status: StatusSink,
    ) -> ConfigResult<(Self, SceneSender, Option<ListenerSender>)> {
        let composite = CoreRenderer::build(&context, "CoreRenderer", config, status.clone())?;
        let flow = SignalFlow::new(composite, context, status)?;

        let scene_cell = flow
            .external_parameter_cell::<DoubleBufferedCore<ObjectVectorParameter>>(
                "objectDataInput",
            )
            .ok_or_else(|| sf_core::ConfigError::PortNotFound("objectDataInput".to_string()))?;
        let scene_port = DoubleBufferedOutput::from_cell(scene_cell);
        let (scene_tx, scene_rx) = AsyncParameterBridge::new(INGRESS_CAPACITY);

        let (listener_port, listener_rx, listener_tx) = if config.listener_tracking {
            let cell = flow
                .external_parameter_cell::<DoubleBufferedCore<ListenerPositionParameter>>(
                    "trackingPositionInput",
                )
                .ok_or_else(|| {
                    sf_core::ConfigError::PortNotFound("trackingPositionInput".to_string())
                })?;
            let (tx, rx) = AsyncParameterBridge::new(INGRESS_CAPACITY);
            (
                Some(DoubleBufferedOutput::from_cell(cell)),
                Some(rx),
                Some(ListenerSender { sender: tx }),
            )
        } else {
            (None, None, None)
        };

        log::info!(
            "renderer initialised: {} inputs, {} outputs",
            flow.num_input_channels(),
            flow.num_output_channels()
        );
        Ok((
            Self {
                flow,
                scene_rx,
                scene_port,
                listener_rx,
                listener_port,
            },
            SceneSender { sender: scene_tx },
            listener_tx,
        ))
    }

    /// Apply pending asynchronous updates; called at the start of a block.
    fn drain_ingress(&mut self) {
        if let Some(scene) = self.scene_rx.latest() {
            self.scene_port.with_back_mut(|value| value.0 = scene);
            self.scene_port.swap_buffers();
        }
        if let (Some(rx), Some(port)) = (&mut self.listener_rx, &self.listener_port) {
            if let Some(listener) = rx.latest() {
                port.with_back_mut(|value| *value = listener);
                port.swap_buffers();
            }
        }
    }

    /// Render one block: inputs and outputs are channel slices of at least
    /// the block size.
    pub fn process_block(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
    ) -> sf_core::ProcessResult<()> {
        self.drain_ingress();
        self.flow.process_block(inputs, outputs)
    }

    /// Set the scene synchronously (same-thread hosts and tests).
    pub fn set_scene(&mut self, scene: ObjectVector) {
        self.scene_port.with_back_mut(|value| value.0 = scene);
        self.scene_port.swap_buffers();
    }

    /// Set the listener pose synchronously. No-op without tracking.
    pub fn set_listener(&mut self, listener: ListenerPositionParameter) {
        if let Some(port) = &self.listener_port {
            port.with_back_mut(|value| *value = listener);
            port.swap_buffers();
        }
    }

    #[inline]
    pub fn num_input_channels(&self) -> usize {
        self.flow.num_input_channels()
    }

    #[inline]
    pub fn num_output_channels(&self) -> usize {
        self.flow.num_output_channels()
    }

    pub fn counters(&self) -> DiagnosticCounters {
        self.flow.counters()
    }

    /// The underlying flow, for diagnostics and advanced hosts.
    pub fn flow(&self) -> &SignalFlow {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut SignalFlow {
        &mut self.flow
    }
}
