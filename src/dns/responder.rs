//! Reply synthesis for routed zones.

use std::net::SocketAddr;

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{RData, Record, RecordType};
use metrics::counter;
use tracing::info;

use super::router::AnswerSet;

/// TTL for synthesized records.
pub const SINKHOLE_TTL: u32 = 90;

/// Build the reply for a query matched by a zone.
///
/// Each A question gets one answer per configured v4 address and each AAAA
/// question one per v6 address, named after the queried name. Other
/// question types contribute nothing; an empty answer section is a valid
/// "no data" reply. Every synthesized answer is logged with the client
/// address.
pub fn synthesize_reply(query: &Message, answers: &AnswerSet, client: SocketAddr) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_response_code(ResponseCode::NoError);

    for question in query.queries() {
        reply.add_query(question.clone());
    }

    for question in query.queries() {
        match question.query_type() {
            RecordType::A => {
                for ip in &answers.v4 {
                    info!(client = %client, "{} -> {}", question.name(), ip);
                    reply.add_answer(Record::from_rdata(
                        question.name().clone(),
                        SINKHOLE_TTL,
                        RData::A(A(*ip)),
                    ));
                }
            }
            RecordType::AAAA => {
                for ip in &answers.v6 {
                    info!(client = %client, "{} -> {}", question.name(), ip);
                    reply.add_answer(Record::from_rdata(
                        question.name().clone(),
                        SINKHOLE_TTL,
                        RData::AAAA(AAAA(*ip)),
                    ));
                }
            }
            _ => {}
        }
    }

    counter!("dns_synthesized_answers_total").increment(reply.answers().len() as u64);
    reply
}
