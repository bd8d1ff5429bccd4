//! Postponed events and injected notes.

use super::PluginState;
use crate::callback::CallbackAction;
use crate::midi::ExternalNote;
use crate::postponed::{PostponedEvent, PostponedEventType};
use std::sync::Arc;

impl PluginState {
    /// Queue an event for the poll thread. Dropped silently when full.
    #[inline]
    pub fn postpone_event(&self, kind: PostponedEventType, value1: i32, value2: i32, value3: f64) {
        self.postponed.postpone(kind, value1, value2, value3);
    }

    /// Drain the postponed queue and publish each event to the GUI, the
    /// control sink and the host callback. Off the audio thread only.
    pub fn post_events_run(&mut self) {
        let events = self.postponed.take();
        if events.is_empty() {
            return;
        }
        let sink = self.notifier.control();
        let id = self.id;

        for event in events {
            match event.kind {
                PostponedEventType::Null => {}
                PostponedEventType::Debug => {
                    self.notifier.callback(
                        CallbackAction::Debug,
                        id,
                        event.value1,
                        event.value2,
                        event.value3,
                    );
                }
                PostponedEventType::ParameterChange => {
                    if let Ok(index) = usize::try_from(event.value1) {
                        self.backend.ui_parameter_change(index, event.value3);
                    }
                    if let Some(ref sink) = sink {
                        sink.set_parameter_value(id, event.value1, event.value3);
                    }
                    self.notifier.callback(
                        CallbackAction::ParameterValueChanged,
                        id,
                        event.value1,
                        0,
                        event.value3,
                    );
                }
                PostponedEventType::ProgramChange => {
                    if self.programs.is_valid_index(event.value1) {
                        self.programs.current = event.value1;
                        if event.value1 >= 0 {
                            self.refresh_defaults();
                        }
                    }
                    self.backend.ui_program_change(event.value1);
                    if let Some(ref sink) = sink {
                        sink.set_program(id, event.value1);
                        self.publish_values_and_defaults(sink.as_ref());
                    }
                    self.notifier
                        .callback(CallbackAction::ProgramChanged, id, event.value1, 0, 0.0);
                }
                PostponedEventType::MidiProgramChange => {
                    if self.midi_programs.is_valid_index(event.value1) {
                        self.midi_programs.current = event.value1;
                        if event.value1 >= 0 {
                            self.refresh_defaults();
                        }
                    }
                    self.backend.ui_midi_program_change(event.value1);
                    if let Some(ref sink) = sink {
                        sink.set_midi_program(id, event.value1);
                        self.publish_values_and_defaults(sink.as_ref());
                    }
                    self.notifier.callback(
                        CallbackAction::MidiProgramChanged,
                        id,
                        event.value1,
                        0,
                        0.0,
                    );
                }
                PostponedEventType::NoteOn => {
                    let (channel, note, velocity) =
                        (event.value1 as u8, event.value2 as u8, event.value3 as u8);
                    self.backend.ui_note_on(channel, note, velocity);
                    if let Some(ref sink) = sink {
                        sink.note_on(id, channel, note, velocity);
                    }
                    self.notifier.callback(
                        CallbackAction::NoteOn,
                        id,
                        event.value1,
                        event.value2,
                        event.value3,
                    );
                }
                PostponedEventType::NoteOff => {
                    let (channel, note) = (event.value1 as u8, event.value2 as u8);
                    self.backend.ui_note_off(channel, note);
                    if let Some(ref sink) = sink {
                        sink.note_off(id, channel, note);
                    }
                    self.notifier.callback(
                        CallbackAction::NoteOff,
                        id,
                        event.value1,
                        event.value2,
                        0.0,
                    );
                }
                PostponedEventType::Custom => self.handle_custom(&event, sink.as_deref()),
            }
        }
    }

    fn handle_custom(&mut self, event: &PostponedEvent, sink: Option<&dyn crate::control::ControlSink>) {
        if self.backend.handle_custom_event(event) {
            return;
        }
        let Some(ref data) = event.data else {
            return;
        };
        match self.custom_data.set(Arc::unwrap_or_clone(data.clone())) {
            Ok(()) => {
                if let Some(sink) = sink {
                    sink.set_custom_data(self.id, data);
                }
            }
            Err(e) => tracing::warn!(id = self.id, "dropping custom data: {}", e),
        }
    }

    /// Inject a note (velocity 0 = note-off). The audio thread picks it up
    /// at the start of the next block.
    pub fn send_midi_single_note(
        &mut self,
        channel: u8,
        note: u8,
        velocity: u8,
        send_gui: bool,
        send_osc: bool,
        send_callback: bool,
    ) {
        let channel = channel & 0x0F;
        let note = note & 0x7F;
        let velocity = velocity & 0x7F;

        if !self.backend.forward_note(channel, note, velocity)
            && !self.ext_notes.push(ExternalNote {
                channel,
                note,
                velocity,
            })
        {
            tracing::warn!(id = self.id, "external note queue full, dropping note");
        }

        if send_gui {
            if velocity > 0 {
                self.backend.ui_note_on(channel, note, velocity);
            } else {
                self.backend.ui_note_off(channel, note);
            }
        }
        if send_osc {
            if let Some(sink) = self.notifier.control() {
                if velocity > 0 {
                    sink.note_on(self.id, channel, note, velocity);
                } else {
                    sink.note_off(self.id, channel, note);
                }
            }
        }
        if send_callback {
            let action = if velocity > 0 {
                CallbackAction::NoteOn
            } else {
                CallbackAction::NoteOff
            };
            self.notifier.callback(
                action,
                self.id,
                channel as i32,
                note as i32,
                velocity as f64,
            );
        }
    }

    /// Release every note on the control channel. Observers additionally
    /// see 128 individual note-offs through the postponed queue.
    pub fn send_midi_all_notes_off(&mut self) {
        let channel = self.ctrl_in_channel.max(0) as u8;
        for note in 0..128u8 {
            if !self.backend.forward_note(channel, note, 0) {
                self.ext_notes.push(ExternalNote {
                    channel,
                    note,
                    velocity: 0,
                });
            }
        }
        self.postponed.fill_note_offs(channel);
    }

    /// Advance the plugin GUI; also drains postponed events for plugins
    /// whose GUI must run on the host's main thread.
    pub fn idle(&mut self) {
        if self.gui_visible {
            self.backend.idle_gui();
        }
        if self.hints.contains(crate::types::PluginHints::USES_SINGLE_THREAD) {
            self.post_events_run();
        }
    }
}
