// Seams between the aggregation core and the outside world.
//
// The core only ever talks to the ledger through `LedgerGateway`. The production
// gateway issues read-only calls against the AllocationManager over an alloy provider,
// tests swap in the recording mock.
//
// <caller> --keys, height--> Aggregator --per set--> Resolver (members || strategies) --> Fetcher --> snapshot
//                                  \___________________ LimitedGateway (permits) ______________/
//                                                              |
//                                                        LedgerGateway

pub mod gateway;
