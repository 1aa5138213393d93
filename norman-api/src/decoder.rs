use serde_json::Value;

use crate::models::Notification;

/// Splits the hub's notification stream into JSON objects.
///
/// The long-poll body is a sequence of concatenated JSON objects with no
/// delimiter, delivered in arbitrary chunks. Objects are cut at the brace that
/// closes the outermost level; braces inside strings do not count.
pub struct NotificationDecoder {
    buffer: Vec<u8>,
    capacity: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl NotificationDecoder {
    pub const DEFAULT_CAPACITY: usize = 64 * 1024;

    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity,
            depth: 0,
            in_string: false,
            escaped: false,
        }
    }

    /// Feed a chunk and collect every object it completes.
    ///
    /// Bytes outside any object are skipped. Objects that fail to parse are
    /// dropped, as is an object that outgrows the buffer capacity.
    pub fn push_data(&mut self, data: &[u8]) -> Vec<Value> {
        let mut objects = Vec::new();

        for &byte in data {
            if self.depth == 0 {
                if byte == b'{' {
                    self.depth = 1;
                    self.buffer.push(byte);
                }
                continue;
            }

            self.buffer.push(byte);
            if self.buffer.len() > self.capacity {
                tracing::warn!(
                    "Dropping notification larger than {} bytes",
                    self.capacity
                );
                self.clear();
                continue;
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        if let Some(object) = self.take_object() {
                            objects.push(object);
                        }
                    }
                }
                _ => {}
            }
        }

        objects
    }

    /// Like [`push_data`](Self::push_data), keeping only actual notifications.
    pub fn decode(&mut self, data: &[u8]) -> Vec<Notification> {
        self.push_data(data)
            .into_iter()
            .filter_map(Notification::from_value)
            .collect()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }

    /// Bytes held for the object in progress, and the capacity
    pub fn usage(&self) -> (usize, usize) {
        (self.buffer.len(), self.capacity)
    }

    fn take_object(&mut self) -> Option<Value> {
        let parsed = serde_json::from_slice::<Value>(&self.buffer);
        let object = match parsed {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(
                    "Failed to parse notification JSON ({}): {}",
                    e,
                    String::from_utf8_lossy(&self.buffer)
                );
                None
            }
        };

        self.clear();
        object
    }
}

impl Default for NotificationDecoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_concatenated_objects() {
        let mut decoder = NotificationDecoder::default();

        let objects = decoder.push_data(br#"{"Error":0}{"PeripheralList":[{"PeripheralUID":1}]}"#);

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0], json!({ "Error": 0 }));
    }

    #[test]
    fn test_object_split_across_chunks() {
        let mut decoder = NotificationDecoder::default();

        assert!(decoder.decode(br#"{"PeripheralList":[{"Periph"#).is_empty());
        assert!(decoder.decode(br#"eralUID":"#).is_empty());

        let notifications = decoder.decode(br#"12}]}"#);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].peripheral_ids(), vec![12]);
        assert_eq!(decoder.usage().0, 0);
    }

    #[test]
    fn test_acknowledgement_skipped() {
        let mut decoder = NotificationDecoder::default();

        let notifications = decoder.decode(br#"{"Error":0}"#);

        assert!(notifications.is_empty());
    }

    #[test]
    fn test_braces_inside_strings() {
        let mut decoder = NotificationDecoder::default();

        let objects = decoder.push_data(br#"{"Name":"a}b{c","Quote":"x\"}"}"#);

        assert_eq!(objects, vec![json!({ "Name": "a}b{c", "Quote": "x\"}" })]);
    }

    #[test]
    fn test_malformed_object_dropped() {
        let mut decoder = NotificationDecoder::default();

        let objects = decoder.push_data(br#"{"PeripheralList":[1,]}{"PeripheralList":[2]}"#);

        assert_eq!(objects, vec![json!({ "PeripheralList": [2] })]);
    }

    #[test]
    fn test_noise_between_objects() {
        let mut decoder = NotificationDecoder::default();

        let objects = decoder.push_data(b"\r\n} garbage {\"a\":1}\n");

        assert_eq!(objects, vec![json!({ "a": 1 })]);
    }

    #[test]
    fn test_oversized_object_dropped() {
        let mut decoder = NotificationDecoder::new(16);

        let objects = decoder.push_data(br#"{"PeripheralList":[1,2,3,4,5,6]}{"a":1}"#);

        assert_eq!(objects, vec![json!({ "a": 1 })]);
    }
}
